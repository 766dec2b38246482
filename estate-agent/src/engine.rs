//! Tool execution engine.
//!
//! Decides, per invocation, whether to skip, auto-execute, wait for
//! confirmation, run a confirmed call or reject it, then runs the chosen
//! executor. Every executor outcome goes through the session's
//! [`ExecutionLedger`] so a given invocation id runs at most once.

use crate::confirmation::{ConfirmationStatus, Resolution};
use crate::error::PipelineError;
use crate::message::{Message, ToolInvocation};
use estate_tools::{ExecutorSet, ToolContext, ToolExecutor, ToolRegistry};
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default bound on a single executor call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Execution ledger
// ============================================================================

#[derive(Debug, Clone)]
enum LedgerEntry {
    Running,
    Finished(ToolInvocation),
}

/// Result of trying to claim an invocation for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller owns the execution and must call [`ExecutionLedger::finish`].
    Granted,
    /// Another task is executing this id right now.
    InFlight,
    /// The id already ran; here is its outcome.
    Finished(ToolInvocation),
}

/// Session-owned record of executor runs keyed by invocation id.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLedger {
    entries: Arc<Mutex<HashMap<String, LedgerEntry>>>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `invocation_id` for execution.
    pub async fn claim(&self, invocation_id: &str) -> Claim {
        let mut entries = self.entries.lock().await;
        match entries.get(invocation_id) {
            Some(LedgerEntry::Running) => Claim::InFlight,
            Some(LedgerEntry::Finished(outcome)) => Claim::Finished(outcome.clone()),
            None => {
                entries.insert(invocation_id.to_string(), LedgerEntry::Running);
                Claim::Granted
            }
        }
    }

    /// Record the terminal outcome of a claimed execution.
    pub async fn finish(&self, outcome: ToolInvocation) {
        let mut entries = self.entries.lock().await;
        entries.insert(outcome.id.clone(), LedgerEntry::Finished(outcome));
    }

    /// Recorded outcome for an id, if it finished.
    pub async fn outcome(&self, invocation_id: &str) -> Option<ToolInvocation> {
        match self.entries.lock().await.get(invocation_id) {
            Some(LedgerEntry::Finished(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Number of finished executions.
    pub async fn finished_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| matches!(e, LedgerEntry::Finished(_)))
            .count()
    }
}

// ============================================================================
// Decision table
// ============================================================================

/// What the engine does with one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Already terminal
    Skip,
    /// Tool name absent from the registry
    UnknownTool,
    /// Registry supplies an automatic executor
    AutoExecute,
    /// No automatic executor and no decision yet
    AwaitConfirmation,
    /// Confirmed by the user; run the caller-supplied executor
    ExecuteConfirmed,
    /// Declined by the user
    Reject,
}

/// Pick the action for an invocation.
pub fn decide(
    invocation: &ToolInvocation,
    status: ConfirmationStatus,
    registry: &ToolRegistry,
) -> Action {
    if invocation.state.is_terminal() {
        return Action::Skip;
    }

    let Some(definition) = registry.get(&invocation.tool_name) else {
        return Action::UnknownTool;
    };

    if !definition.requires_confirmation() {
        return Action::AutoExecute;
    }

    match status {
        ConfirmationStatus::StillPending => Action::AwaitConfirmation,
        ConfirmationStatus::Confirmed => Action::ExecuteConfirmed,
        ConfirmationStatus::Rejected => Action::Reject,
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Runs invocations against the registry and the caller-supplied executors.
#[derive(Clone)]
pub struct ToolEngine {
    registry: Arc<ToolRegistry>,
    executors: ExecutorSet,
    ledger: ExecutionLedger,
    timeout: Duration,
}

impl ToolEngine {
    pub fn new(registry: Arc<ToolRegistry>, executors: ExecutorSet, ledger: ExecutionLedger) -> Self {
        Self {
            registry,
            executors,
            ledger,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Produce the updated record for one invocation.
    ///
    /// Never fails: tool-level errors end up as an `errored` record.
    pub async fn process(
        &self,
        invocation: &ToolInvocation,
        status: ConfirmationStatus,
        ctx: ToolContext,
    ) -> ToolInvocation {
        let action = decide(invocation, status, &self.registry);
        tracing::debug!(
            invocation_id = %invocation.id,
            tool = %invocation.tool_name,
            action = ?action,
            "Processing tool invocation"
        );

        let outcome = match action {
            Action::Skip => return invocation.clone(),
            Action::UnknownTool => {
                let err = PipelineError::UnknownTool {
                    tool: invocation.tool_name.clone(),
                };
                invocation.clone().errored(err.to_result_text())
            }
            Action::AwaitConfirmation => invocation.clone().awaiting_confirmation(),
            Action::Reject => invocation.clone().rejected(),
            Action::AutoExecute => {
                let executor = self
                    .registry
                    .get(&invocation.tool_name)
                    .and_then(|d| d.auto_executor.clone());
                match executor {
                    Some(executor) => self.run(invocation, executor, ctx).await,
                    None => invocation.clone().awaiting_confirmation(),
                }
            }
            Action::ExecuteConfirmed => match self.executors.get(&invocation.tool_name) {
                Some(executor) => self.run(invocation, executor, ctx).await,
                None => {
                    let err = PipelineError::MissingExecutor {
                        tool: invocation.tool_name.clone(),
                    };
                    invocation.clone().errored(err.to_result_text())
                }
            },
        };

        tracing::info!(
            invocation_id = %outcome.id,
            tool = %outcome.tool_name,
            state = %outcome.state,
            "Tool invocation processed"
        );
        outcome
    }

    async fn run(
        &self,
        invocation: &ToolInvocation,
        executor: Arc<dyn ToolExecutor>,
        ctx: ToolContext,
    ) -> ToolInvocation {
        match self.ledger.claim(&invocation.id).await {
            Claim::Granted => {}
            Claim::Finished(outcome) => {
                tracing::debug!(invocation_id = %invocation.id, "Reusing recorded outcome");
                return outcome;
            }
            Claim::InFlight => {
                tracing::warn!(invocation_id = %invocation.id, "Execution already in flight");
                return invocation.clone();
            }
        }

        let call = tokio::time::timeout(
            self.timeout,
            executor.call(invocation.arguments.clone(), &ctx),
        );
        let failure = |message: String| {
            PipelineError::ExecutorFailure {
                tool: invocation.tool_name.clone(),
                message,
            }
            .to_result_text()
        };

        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(Ok(result))) if result.success => invocation.clone().executed(result.output),
            Ok(Ok(Ok(result))) => {
                let message = result.error.unwrap_or(result.output);
                invocation.clone().errored(failure(message))
            }
            Ok(Ok(Err(e))) => invocation.clone().errored(failure(format!("{e:#}"))),
            Ok(Err(_)) => invocation
                .clone()
                .errored(failure(format!("timed out after {}s", self.timeout.as_secs_f64()))),
            Err(_) => invocation.clone().errored(failure("executor panicked".to_string())),
        };

        self.ledger.finish(outcome.clone()).await;
        outcome
    }

    /// Process every non-terminal invocation in `history` concurrently.
    ///
    /// Returns the updated records keyed by invocation id once all of them
    /// are done. On cancellation, running executions are detached: they keep
    /// going and land in the ledger, but nothing is returned for this turn.
    pub async fn process_all(
        &self,
        history: &[Message],
        resolution: &Resolution,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, ToolInvocation>, PipelineError> {
        let mut seen = HashSet::new();
        let pending: Vec<&ToolInvocation> = history
            .iter()
            .flat_map(|m| m.invocations.iter())
            .filter(|inv| !inv.state.is_terminal())
            .filter(|inv| seen.insert(inv.id.clone()))
            .collect();

        let mut outcomes = HashMap::with_capacity(pending.len());
        if pending.is_empty() {
            return Ok(outcomes);
        }

        let mut join_set = JoinSet::new();
        for invocation in &pending {
            let engine = self.clone();
            let invocation = (*invocation).clone();
            let status = resolution.status(&invocation.id);
            let ctx = ToolContext::new(session_id, &invocation.id)
                .with_cancellation(cancel.child_token());
            join_set.spawn(async move { engine.process(&invocation, status, ctx).await });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        session_id = %session_id,
                        in_flight = join_set.len(),
                        "Turn cancelled during tool execution"
                    );
                    join_set.detach_all();
                    return Err(PipelineError::Cancelled);
                }
                next = join_set.join_next() => match next {
                    Some(Ok(outcome)) => {
                        outcomes.insert(outcome.id.clone(), outcome);
                    }
                    Some(Err(e)) => {
                        tracing::error!(session_id = %session_id, error = %e, "Tool task failed");
                    }
                    None => break,
                },
            }
        }

        for invocation in pending {
            if !outcomes.contains_key(&invocation.id) {
                let err = PipelineError::ExecutorFailure {
                    tool: invocation.tool_name.clone(),
                    message: "execution task did not complete".to_string(),
                };
                outcomes.insert(
                    invocation.id.clone(),
                    invocation.clone().errored(err.to_result_text()),
                );
            }
        }

        Ok(outcomes)
    }
}

impl std::fmt::Debug for ToolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEngine")
            .field("tools", &self.registry.names())
            .field("executors", &self.executors)
            .field("timeout", &self.timeout)
            .finish()
    }
}

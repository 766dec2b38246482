//! Conversation session.
//!
//! Owns the conversation state, the execution ledger, the tool registry and
//! the generation source, and runs the turn pipeline:
//!
//! 1. record the incoming messages
//! 2. resolve confirmations and execute tools (concurrently, then barrier)
//! 3. reconcile and stream
//! 4. on success, persist the reconciled history and the assistant reply
//!
//! Turns run one at a time per session. The turn lock is held until the
//! completion callback has applied its changes, and scheduled tasks wait
//! for it too, so the history has one writer at a time.
//!
//! The tool registry can be replaced between turns; each turn reads it
//! once when it starts.

use crate::confirmation::resolve;
use crate::engine::{ExecutionLedger, ToolEngine, DEFAULT_TOOL_TIMEOUT};
use crate::error::PipelineError;
use crate::message::Message;
use crate::orchestrator::{Orchestrator, TurnOutcome, TurnStream, DEFAULT_STREAM_BUFFER};
use crate::provider::{GenerationRequest, GenerationSource};
use crate::reconciler::{reconcile, result_chunks};
use crate::state::{reduce, ConversationEvent, ConversationState};
use estate_common::config::AgentConfig;
use estate_common::logging::generate_trace_id;
use estate_tools::{ExecutorSet, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    pub tool_timeout: Duration,
    pub stream_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl From<&AgentConfig> for SessionOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            stream_buffer: config.stream_buffer,
        }
    }
}

async fn apply(state: &Mutex<ConversationState>, event: ConversationEvent) {
    let mut guard = state.lock().await;
    let current = std::mem::take(&mut *guard);
    *guard = reduce(current, event);
}

/// One conversation.
pub struct Session {
    id: String,
    state: Arc<Mutex<ConversationState>>,
    ledger: ExecutionLedger,
    registry: RwLock<Arc<ToolRegistry>>,
    source: Arc<dyn GenerationSource>,
    options: SessionOptions,
    turn_lock: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        registry: Arc<ToolRegistry>,
        source: Arc<dyn GenerationSource>,
    ) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(ConversationState::new())),
            ledger: ExecutionLedger::new(),
            registry: RwLock::new(registry),
            source,
            options: SessionOptions::default(),
            turn_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Registry the next turn will use.
    pub async fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.read().await.clone()
    }

    /// Replace the tool registry. A turn already running keeps the old one.
    pub async fn set_registry(&self, registry: Arc<ToolRegistry>) {
        tracing::info!(session_id = %self.id, tools = registry.len(), "Tool registry replaced");
        *self.registry.write().await = registry;
    }

    /// Snapshot of the conversation state.
    pub async fn state(&self) -> ConversationState {
        self.state.lock().await.clone()
    }

    /// Snapshot of the message history.
    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.message_history.clone()
    }

    /// Apply an event directly.
    pub async fn apply(&self, event: ConversationEvent) {
        apply(&self.state, event).await;
    }

    /// Handle a scheduled-task event. Does not touch the tool pipeline.
    ///
    /// Waits for a running turn to finish so the note never lands inside it.
    pub async fn run_scheduled_task(&self, description: &str) {
        let _turn_guard = self.turn_lock.lock().await;
        tracing::info!(session_id = %self.id, description = %description, "Running scheduled task");
        self.apply(ConversationEvent::task_scheduled(description)).await;
    }

    /// Run one turn and return its outbound stream.
    ///
    /// `executors` supplies the executors for confirmation-required tools.
    /// Fails only if `cancel` fires before streaming starts.
    pub async fn run_turn(
        &self,
        incoming: Vec<Message>,
        executors: ExecutorSet,
        cancel: CancellationToken,
    ) -> Result<TurnStream, PipelineError> {
        let trace_id = generate_trace_id();
        let span = tracing::info_span!("turn", session_id = %self.id, trace_id = %trace_id);

        async move {
            let turn_guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                guard = self.turn_lock.clone().lock_owned() => guard,
            };

            tracing::debug!(incoming = incoming.len(), "Turn started");
            self.apply(ConversationEvent::MessagesReceived(incoming)).await;
            let history = self.history().await;

            let registry = self.registry().await;
            let resolution = resolve(&history);
            let engine = ToolEngine::new(registry.clone(), executors, self.ledger.clone())
                .with_timeout(self.options.tool_timeout);
            let outcomes = engine
                .process_all(&history, &resolution, &self.id, &cancel)
                .await?;

            let reconciled = reconcile(&history, &outcomes);
            let pre_chunks = result_chunks(&history, &outcomes);
            tracing::debug!(
                processed = outcomes.len(),
                results = pre_chunks.len(),
                "Tool invocations reconciled"
            );

            let request = GenerationRequest {
                messages: reconciled.clone(),
                tools: registry.specs(),
                system: self.options.system_prompt.clone(),
            };

            let state = self.state.clone();
            let session_id = self.id.clone();
            let on_complete = move |outcome: TurnOutcome| async move {
                let _turn_guard = turn_guard;
                match outcome {
                    TurnOutcome::Completed(summary) => {
                        apply(&state, ConversationEvent::Reconciled(reconciled)).await;
                        apply(&state, ConversationEvent::TurnCompleted(summary.into_message())).await;
                    }
                    TurnOutcome::Failed(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Turn not persisted");
                    }
                    TurnOutcome::Cancelled => {
                        tracing::info!(session_id = %session_id, "Cancelled turn not persisted");
                    }
                }
            };

            let orchestrator = Orchestrator::new(self.source.clone(), engine)
                .with_buffer(self.options.stream_buffer);
            Ok(orchestrator.stream(request, pre_chunks, &self.id, &cancel, on_complete))
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("source", &self.source.name())
            .field("options", &self.options)
            .finish()
    }
}

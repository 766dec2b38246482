//! Streaming orchestrator.
//!
//! Announces the id of the assistant reply, emits the tool results resolved
//! before generation, then drives the generation source and forwards its
//! output as it arrives. Chunks travel
//! through a bounded channel to a [`TurnStream`]; the completion callback
//! runs exactly once when the pump stops, before the stream ends.

use crate::confirmation::ConfirmationStatus;
use crate::engine::ToolEngine;
use crate::error::PipelineError;
use crate::message::{Message, ToolInvocation};
use crate::protocol::{FinishReason, StreamChunk, Usage};
use crate::provider::{GenerationEvent, GenerationRequest, GenerationSource};
use estate_tools::ToolContext;
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Default channel capacity between the pump and the caller.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// What a turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnSummary {
    /// Id announced in the turn's start chunk
    pub message_id: String,
    /// Accumulated generated text
    pub text: String,
    /// Tool calls proposed during generation, already processed
    pub invocations: Vec<ToolInvocation>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl TurnSummary {
    /// The assistant message to persist.
    pub fn into_message(self) -> Message {
        let mut message = Message::assistant(self.text);
        if !self.message_id.is_empty() {
            message.id = self.message_id;
        }
        message.invocations = self.invocations;
        message
    }
}

/// Passed to the completion callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(TurnSummary),
    Failed(PipelineError),
    Cancelled,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Outbound chunk stream of one turn.
///
/// Dropping it cancels the turn. Once the turn is cancelled it yields
/// nothing more, even if chunks are still buffered.
pub struct TurnStream {
    rx: mpsc::Receiver<StreamChunk>,
    message_id: String,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl TurnStream {
    fn new(rx: mpsc::Receiver<StreamChunk>, message_id: String, cancel: CancellationToken) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            rx,
            message_id,
            cancel,
            _guard: guard,
        }
    }

    /// Id the assistant reply is persisted under.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Token that cancels this turn.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for TurnStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("message_id", &self.message_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Drives generation and merges its output with tool results.
#[derive(Clone)]
pub struct Orchestrator {
    source: Arc<dyn GenerationSource>,
    engine: ToolEngine,
    buffer: usize,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn GenerationSource>, engine: ToolEngine) -> Self {
        Self {
            source,
            engine,
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start streaming a turn.
    ///
    /// `pre_chunks` are emitted before any generated output. `on_complete`
    /// is called exactly once with the turn's outcome; it never sees
    /// `Completed` for a cancelled turn.
    pub fn stream<F, Fut>(
        &self,
        request: GenerationRequest,
        pre_chunks: Vec<StreamChunk>,
        session_id: &str,
        cancel: &CancellationToken,
        on_complete: F,
    ) -> TurnStream
    where
        F: FnOnce(TurnOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let turn_cancel = cancel.child_token();
        let message_id = uuid::Uuid::new_v4().to_string();
        let pump = Pump {
            source: self.source.clone(),
            engine: self.engine.clone(),
            session_id: session_id.to_string(),
            message_id: message_id.clone(),
            tx,
            cancel: turn_cancel.clone(),
        };

        tokio::spawn(async move {
            let outcome = pump.run(request, pre_chunks).await;
            match &outcome {
                TurnOutcome::Completed(summary) => tracing::info!(
                    session_id = %pump.session_id,
                    text_len = summary.text.len(),
                    tool_calls = summary.invocations.len(),
                    "Turn completed"
                ),
                TurnOutcome::Failed(e) => {
                    tracing::warn!(session_id = %pump.session_id, error = %e, "Turn failed")
                }
                TurnOutcome::Cancelled => {
                    tracing::info!(session_id = %pump.session_id, "Turn cancelled")
                }
            }
            // The caller's stream ends only after the outcome is handled.
            on_complete(outcome).await;
            drop(pump);
        });

        TurnStream::new(rx, message_id, turn_cancel)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("source", &self.source.name())
            .field("buffer", &self.buffer)
            .finish()
    }
}

struct Pump {
    source: Arc<dyn GenerationSource>,
    engine: ToolEngine,
    session_id: String,
    message_id: String,
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
}

impl Pump {
    /// Send one chunk. `false` means the turn is over for the caller.
    async fn send(&self, chunk: StreamChunk) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(chunk) => sent.is_ok(),
        }
    }

    async fn fail(&self, err: PipelineError) -> TurnOutcome {
        if !self.send(StreamChunk::Error(err.to_string())).await {
            return TurnOutcome::Cancelled;
        }
        TurnOutcome::Failed(err)
    }

    async fn run(&self, request: GenerationRequest, pre_chunks: Vec<StreamChunk>) -> TurnOutcome {
        let start = StreamChunk::Start {
            message_id: self.message_id.clone(),
        };
        for chunk in std::iter::once(start).chain(pre_chunks) {
            if !self.send(chunk).await {
                return TurnOutcome::Cancelled;
            }
        }

        let generation = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TurnOutcome::Cancelled,
            generation = self.source.generate(request) => generation,
        };
        let mut generation = match generation {
            Ok(stream) => stream,
            Err(e) => return self.fail(e).await,
        };

        let mut summary = TurnSummary {
            message_id: self.message_id.clone(),
            ..TurnSummary::default()
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TurnOutcome::Cancelled,
                next = generation.next() => next,
            };

            match next {
                Some(Ok(GenerationEvent::TextDelta(text))) => {
                    summary.text.push_str(&text);
                    if !self.send(StreamChunk::Text(text)).await {
                        return TurnOutcome::Cancelled;
                    }
                }
                Some(Ok(GenerationEvent::ToolCall(invocation))) => {
                    let call = StreamChunk::ToolCall {
                        id: invocation.id.clone(),
                        tool_name: invocation.tool_name.clone(),
                        arguments: invocation.arguments.clone(),
                    };
                    if !self.send(call).await {
                        return TurnOutcome::Cancelled;
                    }

                    // Runs to completion even if cancelled meanwhile; the
                    // executor sees the cancellation through its context.
                    let ctx = ToolContext::new(&self.session_id, &invocation.id)
                        .with_cancellation(self.cancel.child_token());
                    let processed = self
                        .engine
                        .process(&invocation, ConfirmationStatus::StillPending, ctx)
                        .await;

                    if let Some(result) = &processed.result {
                        let chunk = StreamChunk::ToolResult {
                            id: processed.id.clone(),
                            result: result.clone(),
                        };
                        if !self.send(chunk).await {
                            return TurnOutcome::Cancelled;
                        }
                    }
                    summary.invocations.push(processed);
                }
                Some(Ok(GenerationEvent::Finish { reason, usage })) => {
                    summary.finish_reason = reason;
                    summary.usage = usage;
                    if !self.send(StreamChunk::Finish { reason, usage }).await {
                        return TurnOutcome::Cancelled;
                    }
                    return TurnOutcome::Completed(summary);
                }
                Some(Err(e)) => return self.fail(e).await,
                None => {
                    let err = PipelineError::GenerationFailure(
                        "stream ended without a finish event".to_string(),
                    );
                    return self.fail(err).await;
                }
            }
        }
    }
}

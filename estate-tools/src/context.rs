//! Tool context for a single invocation.
//!
//! Carries the session and invocation ids plus the cancellation signal of
//! the turn that triggered the call.

use tokio_util::sync::CancellationToken;

/// Context passed to tools and executors.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Conversation the call belongs to
    pub session_id: String,
    /// Invocation id assigned by the model
    pub invocation_id: String,
    /// Fires when the owning turn is cancelled
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Create a new context with a fresh cancellation token.
    pub fn new(session_id: &str, invocation_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            invocation_id: invocation_id.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Tie this context to an existing cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the owning turn has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

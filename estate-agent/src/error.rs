//! Pipeline error taxonomy.
//!
//! Tool-level failures (`UnknownTool`, `ExecutorFailure`, `MissingExecutor`)
//! are recovered locally: they end only the affected invocation, which is
//! recorded `errored` with [`PipelineError::to_result_text`] as its result.
//! `GenerationFailure` and `Cancelled` end the outbound stream.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The invocation names a tool absent from the registry
    #[error("unknown tool: {tool}")]
    UnknownTool { tool: String },

    /// The tool's executor failed or returned a failure result
    #[error("tool {tool} failed: {message}")]
    ExecutorFailure { tool: String, message: String },

    /// A confirmed invocation has no caller-supplied executor
    #[error("no executor supplied for confirmed tool {tool}")]
    MissingExecutor { tool: String },

    /// The generation source failed mid-stream
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// The turn was cancelled by the caller
    #[error("turn cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Human-readable result recorded on an errored invocation.
    pub fn to_result_text(&self) -> String {
        format!("Error: {self}")
    }
}

impl From<PipelineError> for estate_common::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled => Self::Cancelled,
            PipelineError::GenerationFailure(message) => Self::External(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

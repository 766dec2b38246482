//! Generation source abstraction.
//!
//! A generation source takes the reconciled history plus the tool
//! descriptor set and yields a lazy, ordered, finite stream of events that
//! ends with a finish event or an error. Dropping the stream cancels the
//! upstream request.

use crate::error::PipelineError;
use crate::message::{Message, ToolInvocation};
use crate::protocol::{FinishReason, Usage};
use async_trait::async_trait;
use estate_tools::ToolSpec;
use futures_util::stream::BoxStream;

/// Input for one generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Reconciled history, oldest first
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolSpec>,
    /// System prompt, if configured
    pub system: Option<String>,
}

/// One unit of generated output.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    TextDelta(String),
    /// The model proposes a tool call. The invocation is in `proposed` state.
    ToolCall(ToolInvocation),
    Finish { reason: FinishReason, usage: Usage },
}

pub type GenerationStream = BoxStream<'static, Result<GenerationEvent, PipelineError>>;

/// Something that generates model output.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Start a generation.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationStream, PipelineError>;
}

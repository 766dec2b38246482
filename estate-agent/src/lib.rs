//! Estate Agent - tool-call confirmation and streaming pipeline.
//!
//! Per turn, the pipeline runs in this order:
//!
//! 1. [`confirmation`]: find human confirm/reject signals for pending tool calls
//! 2. [`engine`]: decide and run each invocation (at most once per id)
//! 3. [`reconciler`]: put every outcome back in place in the history
//! 4. [`orchestrator`]: stream tool results and generated output to the caller
//!
//! [`session::Session`] ties the steps together over a [`state::ConversationState`]
//! that only changes through [`state::reduce`].

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod confirmation;
pub mod engine;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod reconciler;
pub mod session;
pub mod state;

pub use confirmation::{resolve, ConfirmationStatus, Resolution};
pub use engine::{decide, Action, ExecutionLedger, ToolEngine};
pub use error::PipelineError;
pub use message::{InvocationState, Message, Role, ToolInvocation};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnStream, TurnSummary};
pub use protocol::{FinishReason, StreamChunk, Usage};
pub use provider::{GenerationEvent, GenerationRequest, GenerationSource, GenerationStream};
pub use reconciler::reconcile;
pub use session::{Session, SessionOptions};
pub use state::{reduce, ConversationEvent, ConversationState};

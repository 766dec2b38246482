//! Conversation data model.
//!
//! Field names on the wire follow the chat client's message format
//! (`createdAt`, `toolInvocations`, `toolCallId`, `args`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Lifecycle state of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Proposed,
    AwaitingConfirmation,
    Confirmed,
    Rejected,
    Executed,
    Errored,
}

impl InvocationState {
    /// States that carry a result.
    pub fn has_result(self) -> bool {
        matches!(self, Self::Executed | Self::Errored)
    }

    /// States the pipeline never moves out of.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Errored | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-proposed call to a tool.
///
/// Invariant: `result.is_some() == state.has_result()`. The transition
/// methods keep it; [`ToolInvocation::normalize`] restores it for records
/// that arrive from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    #[serde(rename = "toolCallId", alias = "id")]
    pub id: String,
    pub tool_name: String,
    #[serde(rename = "args", alias = "arguments", default)]
    pub arguments: serde_json::Value,
    pub state: InvocationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolInvocation {
    /// A freshly proposed invocation.
    pub fn proposed(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
            state: InvocationState::Proposed,
            result: None,
        }
    }

    pub fn awaiting_confirmation(self) -> Self {
        self.transition(InvocationState::AwaitingConfirmation, None)
    }

    pub fn confirmed(self) -> Self {
        self.transition(InvocationState::Confirmed, None)
    }

    pub fn rejected(self) -> Self {
        self.transition(InvocationState::Rejected, None)
    }

    pub fn executed(self, result: impl Into<String>) -> Self {
        self.transition(InvocationState::Executed, Some(result.into()))
    }

    pub fn errored(self, message: impl Into<String>) -> Self {
        self.transition(InvocationState::Errored, Some(message.into()))
    }

    fn transition(mut self, state: InvocationState, result: Option<String>) -> Self {
        self.state = state;
        self.result = result;
        self
    }

    /// Whether the result/state invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.result.is_some() == self.state.has_result()
    }

    /// Restore the invariant on an externally supplied record.
    ///
    /// A result-bearing state without a result becomes `errored`; a stray
    /// result on any other state is dropped.
    pub fn normalize(self) -> Self {
        if self.is_consistent() {
            return self;
        }
        if self.state.has_result() {
            let message = format!("Error: {} invocation arrived without a result", self.state);
            self.errored(message)
        } else {
            let state = self.state;
            self.transition(state, None)
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "toolInvocations", default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
}

impl Message {
    /// New message with a random id, stamped now.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            invocations: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    /// Find an invocation by id.
    pub fn invocation(&self, id: &str) -> Option<&ToolInvocation> {
        self.invocations.iter().find(|inv| inv.id == id)
    }
}

//! Outbound stream chunks and their data-stream line encoding.
//!
//! Each chunk encodes to one line `<type>:<json>\n`:
//!
//! | Prefix | Part |
//! |---|---|
//! | `f` | message start, carries the assistant message id |
//! | `0` | text delta |
//! | `9` | tool call |
//! | `a` | tool result |
//! | `3` | error |
//! | `d` | finish |

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Response header announcing the data-stream format.
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

/// Token usage reported by the generation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One append-only unit of the outbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// First chunk of every turn. The reply is persisted under this id.
    Start {
        message_id: String,
    },
    Text(String),
    ToolCall {
        id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        id: String,
        result: String,
    },
    Error(String),
    Finish {
        reason: FinishReason,
        usage: Usage,
    },
}

impl StreamChunk {
    /// Wire prefix of this chunk type.
    pub fn prefix(&self) -> char {
        match self {
            Self::Start { .. } => 'f',
            Self::Text(_) => '0',
            Self::ToolCall { .. } => '9',
            Self::ToolResult { .. } => 'a',
            Self::Error(_) => '3',
            Self::Finish { .. } => 'd',
        }
    }

    /// Encode as a single newline-terminated line.
    pub fn encode(&self) -> String {
        let payload = match self {
            Self::Start { message_id } => json!({ "messageId": message_id }),
            Self::Text(text) => json!(text),
            Self::ToolCall {
                id,
                tool_name,
                arguments,
            } => json!({ "toolCallId": id, "toolName": tool_name, "args": arguments }),
            Self::ToolResult { id, result } => json!({ "toolCallId": id, "result": result }),
            Self::Error(message) => json!(message),
            Self::Finish { reason, usage } => json!({ "finishReason": reason, "usage": usage }),
        };
        format!("{}:{}\n", self.prefix(), payload)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Finish { .. })
    }
}

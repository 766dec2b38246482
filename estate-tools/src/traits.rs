//! Core Tool trait and types.
//!
//! All built-in tools implement the `Tool` trait, providing a uniform
//! interface for the registry to describe them and for executors to run them.

use crate::context::ToolContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result from executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Tool output (result text).
    pub output: String,
    /// Error message if failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Tool specification for LLM function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name (must match `name()` method).
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Trait for agent tools.
///
/// Each tool provides:
/// - `name()`: unique identifier
/// - `description()`: what the tool does (shown to LLM)
/// - `parameters_schema()`: JSON Schema for arguments
/// - `requires_confirmation()`: whether a human must approve each call
/// - `execute()`: async function to run the tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Confirmation-required tools are registered without an automatic
    /// executor; their calls run only after a human confirms them.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Execute the tool with given arguments.
    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext)
        -> anyhow::Result<ToolResult>;

    /// Generate a ToolSpec for function calling.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Deserialize tool arguments into their typed request.
pub fn parse_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    args: serde_json::Value,
) -> anyhow::Result<T> {
    serde_json::from_value(args).map_err(|e| anyhow::anyhow!("Invalid arguments for {tool}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn tool_result_success() {
        let result = ToolResult::success("done");
        assert!(result.success);
        assert_eq!(result.output, "done");
        assert!(result.error.is_none());
    }

    #[test]
    fn tool_result_failure() {
        let result = ToolResult::failure("something went wrong");
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("something went wrong"));
    }

    #[test]
    fn tool_spec_serializes() {
        let spec = ToolSpec {
            name: "getLocalTime".to_string(),
            description: "Local time".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"name\":\"getLocalTime\""));
    }

    #[derive(Debug, Deserialize)]
    struct CityArgs {
        city: String,
    }

    #[test]
    fn parse_args_typed() {
        let args: CityArgs = parse_args("weather", serde_json::json!({"city": "Paris"})).unwrap();
        assert_eq!(args.city, "Paris");

        let err = parse_args::<CityArgs>("weather", serde_json::json!({"town": "Paris"}))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for weather"));
    }
}

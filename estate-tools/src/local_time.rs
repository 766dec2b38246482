//! Local time tool. Runs automatically.

use crate::context::ToolContext;
use crate::traits::{parse_args, Tool, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct LocalTimeArgs {
    location: String,
}

/// Local time tool.
#[derive(Debug, Default)]
pub struct LocalTimeTool;

impl LocalTimeTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for LocalTimeTool {
    fn name(&self) -> &str {
        "getLocalTime"
    }

    fn description(&self) -> &str {
        "Get the local time for a specified location."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Location to get the time for"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: LocalTimeArgs = parse_args(self.name(), args)?;
        let now = chrono::Local::now();
        Ok(ToolResult::success(format!(
            "The local time in {} is {}.",
            args.location,
            now.format("%H:%M")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_without_confirmation() {
        let tool = LocalTimeTool::new();
        assert_eq!(tool.name(), "getLocalTime");
        assert!(!tool.requires_confirmation());
    }

    #[tokio::test]
    async fn formats_time_for_location() {
        let tool = LocalTimeTool::new();
        let result = tool
            .execute(json!({"location": "Lisbon"}), &ToolContext::new("s", "t2"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("The local time in Lisbon is "));
    }

    #[tokio::test]
    async fn wrong_argument_type_is_error() {
        let tool = LocalTimeTool::new();
        let err = tool
            .execute(json!({"location": 42}), &ToolContext::new("s", "t2"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("getLocalTime"));
    }
}

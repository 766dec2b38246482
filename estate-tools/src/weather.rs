//! Weather lookup tool.
//!
//! Needs human confirmation before each call; the registry declares it
//! without an automatic executor.

use crate::context::ToolContext;
use crate::traits::{parse_args, Tool, ToolResult};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;

const CONDITIONS: &[&str] = &["sunny", "cloudy", "rainy", "snowy"];

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

/// Weather information tool.
#[derive(Debug, Default)]
pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "getWeatherInformation"
    }

    fn description(&self) -> &str {
        "Show the weather in a given city to the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City to look up"
                }
            },
            "required": ["city"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let args: WeatherArgs = parse_args(self.name(), args)?;
        if args.city.trim().is_empty() {
            return Ok(ToolResult::failure("City must not be empty"));
        }

        let condition = CONDITIONS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("sunny");

        tracing::debug!(invocation_id = %ctx.invocation_id, city = %args.city, "Weather lookup");
        Ok(ToolResult::success(format!(
            "The weather in {} is {}.",
            args.city, condition
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_schema() {
        let tool = WeatherTool::new();
        assert_eq!(tool.name(), "getWeatherInformation");
        assert!(tool.requires_confirmation());
        let schema = tool.parameters_schema();
        assert!(schema["properties"]["city"].is_object());
    }

    #[tokio::test]
    async fn reports_weather_for_city() {
        let tool = WeatherTool::new();
        let result = tool
            .execute(json!({"city": "Paris"}), &ToolContext::new("s", "t1"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("The weather in Paris is "));
        assert!(CONDITIONS.iter().any(|c| result.output.ends_with(&format!("{c}."))));
    }

    #[tokio::test]
    async fn missing_city_is_error() {
        let tool = WeatherTool::new();
        let result = tool.execute(json!({}), &ToolContext::new("s", "t1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn blank_city_is_failure() {
        let tool = WeatherTool::new();
        let result = tool
            .execute(json!({"city": "  "}), &ToolContext::new("s", "t1"))
            .await
            .unwrap();
        assert!(!result.success);
    }
}

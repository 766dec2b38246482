//! Estate Tools - tool registry and executors for the agent.
//!
//! - [`ToolRegistry`]: name-keyed tool definitions handed to the model,
//!   each with an optional automatic executor
//! - [`ExecutorSet`]: executors the calling layer supplies for tools that
//!   need human confirmation before they run
//! - Built-in tools: `getWeatherInformation` (confirmation required) and
//!   `getLocalTime` (runs automatically)

pub mod context;
pub mod executors;
pub mod local_time;
pub mod registry;
pub mod traits;
pub mod weather;

pub use context::ToolContext;
pub use executors::{ExecutorSet, FnExecutor, ToolAdapter, ToolExecutor};
pub use registry::{ToolDefinition, ToolRegistry};
pub use traits::{Tool, ToolResult, ToolSpec};

pub use local_time::LocalTimeTool;
pub use weather::WeatherTool;

use std::sync::Arc;

/// Registry with every built-in tool.
///
/// `getWeatherInformation` is declared without an automatic executor, so its
/// calls wait for confirmation and run through [`builtin_executors`].
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WeatherTool::new()));
    registry.register(Arc::new(LocalTimeTool::new()));
    registry
}

/// Executors for the built-in confirmation-required tools.
pub fn builtin_executors() -> ExecutorSet {
    ExecutorSet::new().with_tool(Arc::new(WeatherTool::new()))
}

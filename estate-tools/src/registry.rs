//! Tool registry.
//!
//! Static, name-keyed mapping from tool name to its schema and optional
//! automatic executor. The agent core only reads it.

use crate::executors::{ToolAdapter, ToolExecutor};
use crate::traits::{Tool, ToolSpec};
use std::sync::Arc;

/// A registry entry.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
    /// Runs the tool without asking. `None` means every call needs confirmation.
    pub auto_executor: Option<Arc<dyn ToolExecutor>>,
}

impl ToolDefinition {
    /// Declare a tool with no automatic executor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            auto_executor: None,
        }
    }

    /// Attach an automatic executor.
    pub fn with_auto_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.auto_executor = Some(executor);
        self
    }

    /// Build the entry for a tool implementation. The tool becomes its own
    /// automatic executor unless it asks for confirmation.
    pub fn from_tool(tool: Arc<dyn Tool>) -> Self {
        let definition = Self::new(tool.name(), tool.description(), tool.parameters_schema());
        if tool.requires_confirmation() {
            definition
        } else {
            definition.with_auto_executor(Arc::new(ToolAdapter::new(tool)))
        }
    }

    /// True iff there is no automatic executor.
    pub fn requires_confirmation(&self) -> bool {
        self.auto_executor.is_none()
    }

    /// Descriptor handed to the model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameter_schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("requires_confirmation", &self.requires_confirmation())
            .finish()
    }
}

/// Ordered registry of tool definitions.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool implementation.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.define(ToolDefinition::from_tool(tool));
    }

    /// Add a definition. A definition with the same name is replaced in place.
    pub fn define(&mut self, definition: ToolDefinition) {
        if let Some(existing) = self
            .definitions
            .iter_mut()
            .find(|d| d.name == definition.name)
        {
            tracing::debug!(tool = %definition.name, "Replacing tool definition");
            *existing = definition;
        } else {
            self.definitions.push(definition);
        }
    }

    /// Get a definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Tool descriptor set for the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.definitions.iter().map(ToolDefinition::spec).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

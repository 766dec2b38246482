//! Executors: the callable half of a tool.
//!
//! A registry entry may carry an automatic executor. Tools without one need
//! human confirmation, and the calling layer supplies their executors per
//! turn through an [`ExecutorSet`].

use crate::context::ToolContext;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Something that can run a tool call.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the call with the given arguments.
    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<ToolResult>;
}

/// Executes a [`Tool`] implementation.
pub struct ToolAdapter(Arc<dyn Tool>);

impl ToolAdapter {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self(tool)
    }
}

#[async_trait]
impl ToolExecutor for ToolAdapter {
    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        self.0.execute(args, ctx).await
    }
}

/// Executes an async closure.
///
/// ```ignore
/// let executor = FnExecutor::new(|args, _ctx| async move {
///     Ok(ToolResult::success(format!("got {args}")))
/// });
/// ```
pub struct FnExecutor<F>(F);

impl<F, Fut> FnExecutor<F>
where
    F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        (self.0)(args, ctx.clone()).await
    }
}

/// Executors supplied by the calling layer, keyed by tool name.
#[derive(Clone, Default)]
pub struct ExecutorSet {
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ExecutorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an executor for `name`, replacing any previous one.
    pub fn with_executor(mut self, name: impl Into<String>, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    /// Add an async closure as the executor for `name`.
    pub fn with_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
    {
        self.with_executor(name, Arc::new(FnExecutor::new(f)))
    }

    /// Use a tool implementation as the executor for its own name.
    pub fn with_tool(self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        self.with_executor(name, Arc::new(ToolAdapter::new(tool)))
    }

    /// Get the executor for a tool name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(name).cloned()
    }

    /// Tool names with a supplied executor, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSet")
            .field("tools", &self.names())
            .finish()
    }
}

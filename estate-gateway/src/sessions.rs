//! Process-lifetime session store.
//!
//! Sessions are created lazily on first use and never evicted. The tool
//! registry is shared by all sessions and can be replaced at runtime.

use estate_agent::{GenerationSource, Session, SessionOptions};
use estate_tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sessions of one agent, keyed by session id.
#[derive(Clone)]
pub struct SessionStore {
    agent_name: String,
    registry: Arc<RwLock<Arc<ToolRegistry>>>,
    source: Arc<dyn GenerationSource>,
    options: SessionOptions,
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionStore {
    pub fn new(
        agent_name: impl Into<String>,
        registry: Arc<ToolRegistry>,
        source: Arc<dyn GenerationSource>,
        options: SessionOptions,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            registry: Arc::new(RwLock::new(registry)),
            source,
            options,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Whether requests for `agent` are served here.
    pub fn serves(&self, agent: &str) -> bool {
        self.agent_name == agent
    }

    /// Replace the registry for new sessions and for the next turn of
    /// every existing one.
    pub async fn set_registry(&self, registry: Arc<ToolRegistry>) {
        let mut current = self.registry.write().await;
        for session in self.sessions.read().await.values() {
            session.set_registry(registry.clone()).await;
        }
        *current = registry;
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        if let Some(session) = self.get(session_id).await {
            return session;
        }

        let registry = self.registry.read().await;
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(agent = %self.agent_name, session_id = %session_id, "Creating session");
                Arc::new(
                    Session::new(session_id, registry.clone(), self.source.clone())
                        .with_options(self.options.clone()),
                )
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("agent_name", &self.agent_name)
            .field("source", &self.source.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use estate_agent::{GenerationRequest, GenerationStream, PipelineError};

    struct Idle;

    #[async_trait]
    impl GenerationSource for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<GenerationStream, PipelineError> {
            Err(PipelineError::GenerationFailure("idle".into()))
        }
    }

    #[tokio::test]
    async fn replaced_registry_reaches_old_and_new_sessions() {
        let store = SessionStore::new(
            "real-estate-agent",
            Arc::new(estate_tools::builtin_registry()),
            Arc::new(Idle),
            SessionOptions::default(),
        );
        let existing = store.get_or_create("alice").await;
        assert_eq!(existing.registry().await.len(), 2);

        store.set_registry(Arc::new(ToolRegistry::new())).await;

        assert!(existing.registry().await.is_empty());
        assert!(store.get_or_create("bob").await.registry().await.is_empty());
        assert_eq!(store.len().await, 2);
    }
}

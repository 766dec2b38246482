//! Estate Gateway - HTTP surface for the real-estate agent.
//!
//! This crate wires the agent pipeline to the outside world:
//! - Per-session chat turns streamed in the data-stream format
//! - Scheduled tasks, from HTTP or from configured cron entries
//! - Generation through Google AI Studio, optionally behind an AI gateway
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (route → session) → Session turn → Orchestrator → Gemini
//!                                          ↓
//!                                   Tool engine (ledger)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod provider;
pub mod routes;
pub mod scheduler;
pub mod sessions;

pub use provider::{create_source, GeminiSource};
pub use routes::AppState;
pub use scheduler::Scheduler;
pub use sessions::SessionStore;

use axum::Router;
use estate_agent::{GenerationSource, SessionOptions};
use estate_common::config::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

impl AppState {
    /// State for the configured agent with the built-in tools.
    pub fn new(config: &Config, source: Arc<dyn GenerationSource>) -> Self {
        let sessions = SessionStore::new(
            config.agent.name.clone(),
            Arc::new(estate_tools::builtin_registry()),
            source,
            SessionOptions::from(&config.agent),
        );
        Self {
            sessions,
            executors: estate_tools::builtin_executors(),
        }
    }
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state).layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.listen_address();

    let source = create_source(config)?;
    tracing::info!(provider = %config.model.provider, model = %config.model.model, "Using {}", source.name());

    let state = AppState::new(config, source);

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::from_entries(&config.schedules, &config.agent.name);
    let scheduler_handle = if scheduler.is_empty() {
        None
    } else {
        Some(scheduler.spawn(state.sessions.clone(), shutdown.clone()))
    };

    let router = build_router(state);

    tracing::info!("Starting Estate Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    let served = axum::serve(listener, router).await;

    shutdown.cancel();
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    served?;

    Ok(())
}

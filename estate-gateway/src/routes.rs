//! Route definitions for the Estate gateway.
//!
//! - `POST /agents/:agent/:session` streams a chat turn
//! - `POST /agents/:agent/:session/schedule` records a scheduled task
//! - `GET /agents/:agent/:session/messages` returns the history
//! - `GET /health`
//!
//! Unknown agents and paths get a plain `404 Not found`.

use crate::sessions::SessionStore;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use estate_agent::protocol::{DATA_STREAM_HEADER, DATA_STREAM_VERSION};
use estate_agent::Message;
use estate_tools::ExecutorSet;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    /// Executors for confirmation-required tools, supplied to every turn
    pub executors: ExecutorSet,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Chat turn request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Scheduled task request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub description: String,
}

/// Scheduled task response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub status: String,
    pub session: String,
}

/// History response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Handler error. Not-found renders as plain text; everything else as JSON.
#[derive(Debug)]
pub struct ApiError(estate_common::Error);

impl From<estate_common::Error> for ApiError {
    fn from(err: estate_common::Error) -> Self {
        Self(err)
    }
}

impl From<estate_agent::PipelineError> for ApiError {
    fn from(err: estate_agent::PipelineError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_not_found() {
            return not_found();
        }

        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = status
            .canonical_reason()
            .unwrap_or("Error")
            .to_lowercase()
            .replace(' ', "_");
        tracing::warn!(status = status.as_u16(), error = %self.0, "Request failed");
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the agent routes.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/agents/:agent/:session", post(chat_handler))
        .route("/agents/:agent/:session/schedule", post(schedule_handler))
        .route("/agents/:agent/:session/messages", get(messages_handler))
        .fallback(fallback_handler)
        .with_state(state)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn check_agent(state: &AppState, agent: &str) -> Result<(), ApiError> {
    if state.sessions.serves(agent) {
        Ok(())
    } else {
        Err(estate_common::Error::NotFound(format!("agent {agent}")).into())
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "estate-gateway".into(),
    })
}

async fn fallback_handler() -> Response {
    not_found()
}

/// Run a chat turn and stream it back in the data-stream format.
///
/// The turn is set up on its own task. If the client goes away before the
/// stream starts, the guard cancels the turn, which lets tool executions
/// already running finish in the background.
async fn chat_handler(
    State(state): State<AppState>,
    Path((agent, session_id)): Path<(String, String)>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    check_agent(&state, &agent)?;

    let session = state.sessions.get_or_create(&session_id).await;
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let executors = state.executors.clone();
    let setup = tokio::spawn(async move {
        session.run_turn(request.messages, executors, cancel).await
    });
    let stream = setup
        .await
        .map_err(|e| estate_common::Error::Internal(format!("turn setup failed: {e}")))??;
    guard.disarm();

    let body = Body::from_stream(stream.map(|chunk| Ok::<_, Infallible>(chunk.encode())));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(DATA_STREAM_HEADER, DATA_STREAM_VERSION)
        .body(body)
        .map_err(|e| estate_common::Error::Internal(e.to_string()))?;
    Ok(response)
}

/// Record a scheduled task in the conversation.
async fn schedule_handler(
    State(state): State<AppState>,
    Path((agent, session_id)): Path<(String, String)>,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    check_agent(&state, &agent)?;

    let description = request.description.trim();
    if description.is_empty() {
        return Err(estate_common::Error::InvalidInput("description is required".into()).into());
    }

    let session = state.sessions.get_or_create(&session_id).await;
    session.run_scheduled_task(description).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduleResponse {
            status: "scheduled".into(),
            session: session_id,
        }),
    ))
}

/// Current history of a session. Unknown sessions have an empty history.
async fn messages_handler(
    State(state): State<AppState>,
    Path((agent, session_id)): Path<(String, String)>,
) -> Result<Json<MessagesResponse>, ApiError> {
    check_agent(&state, &agent)?;

    let messages = match state.sessions.get(&session_id).await {
        Some(session) => session.history().await,
        None => Vec::new(),
    };
    Ok(Json(MessagesResponse { messages }))
}

//! Integration tests for Estate Gateway.
//!
//! Drives the full HTTP API against a scripted generation source.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use estate_agent::{
    FinishReason, GenerationEvent, GenerationRequest, GenerationSource, GenerationStream,
    PipelineError, Role, ToolInvocation, Usage,
};
use estate_common::config::Config;
use estate_gateway::routes::{HealthResponse, MessagesResponse, ScheduleResponse};
use estate_gateway::{build_router, AppState};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

type Event = Result<GenerationEvent, PipelineError>;

/// Plays one script per generation call, then answers "ok".
struct TurnScripts {
    scripts: Mutex<VecDeque<Vec<Event>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl TurnScripts {
    fn new(scripts: Vec<Vec<Event>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerationSource for TurnScripts {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationStream, PipelineError> {
        self.requests.lock().unwrap().push(request);
        let events = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(GenerationEvent::TextDelta("ok".into())), finish(FinishReason::Stop)]);
        Ok(futures_util::stream::iter(events).boxed())
    }
}

fn finish(reason: FinishReason) -> Event {
    Ok(GenerationEvent::Finish {
        reason,
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
        },
    })
}

fn create_test_app(source: Arc<TurnScripts>) -> axum::Router {
    let config = Config::default();
    build_router(AppState::new(&config, source))
}

async fn send(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> axum::response::Response {
    let request = match body {
        Some(b) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Parse data-stream lines into (prefix, payload) pairs.
fn parse_stream(body: &str) -> Vec<(String, Value)> {
    body.lines()
        .map(|line| {
            let (prefix, payload) = line.split_once(':').unwrap();
            (prefix.to_string(), serde_json::from_str(payload).unwrap())
        })
        .collect()
}

async fn history(app: &axum::Router, session: &str) -> MessagesResponse {
    let response = send(
        app,
        Method::GET,
        &format!("/agents/real-estate-agent/{session}/messages"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_str(&body_text(response).await).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(TurnScripts::new(vec![]));

    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "estate-gateway");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = create_test_app(TurnScripts::new(vec![]));

    let response = send(&app, Method::GET, "/listings/42", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Not found");
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let source = TurnScripts::new(vec![]);
    let app = create_test_app(source.clone());

    let response = send(
        &app,
        Method::POST,
        "/agents/mortgage-agent/alice",
        Some(json!({ "messages": [{ "id": "u1", "role": "user", "content": "hi" }] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Not found");
    assert!(source.requests.lock().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_streams_data_stream_lines() {
    let source = TurnScripts::new(vec![vec![
        Ok(GenerationEvent::TextDelta("Three listings ".into())),
        Ok(GenerationEvent::TextDelta("match your search.".into())),
        finish(FinishReason::Stop),
    ]]);
    let app = create_test_app(source);

    let response = send(
        &app,
        Method::POST,
        "/agents/real-estate-agent/alice",
        Some(json!({ "messages": [{ "id": "u1", "role": "user", "content": "Any flats in Lyon?" }] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");

    let lines = parse_stream(&body_text(response).await);
    let (prefix, start) = &lines[0];
    assert_eq!(prefix, "f");
    let message_id = start["messageId"].as_str().unwrap().to_string();
    assert_eq!(lines[1], ("0".to_string(), json!("Three listings ")));
    assert_eq!(lines[2], ("0".to_string(), json!("match your search.")));
    let (prefix, finish) = lines.last().unwrap();
    assert_eq!(prefix, "d");
    assert_eq!(finish["finishReason"], "stop");

    let messages = history(&app, "alice").await.messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "u1");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].id, message_id);
    assert_eq!(messages[1].content, "Three listings match your search.");
}

#[tokio::test]
async fn test_confirmation_flow_across_requests() {
    let source = TurnScripts::new(vec![
        vec![
            Ok(GenerationEvent::ToolCall(ToolInvocation::proposed(
                "w1",
                "getWeatherInformation",
                json!({ "city": "Paris" }),
            ))),
            finish(FinishReason::ToolCalls),
        ],
        vec![
            Ok(GenerationEvent::TextDelta("Good day for a viewing.".into())),
            finish(FinishReason::Stop),
        ],
    ]);
    let app = create_test_app(source.clone());
    let uri = "/agents/real-estate-agent/bob";

    // First request: the call is proposed and held for confirmation.
    let response = send(
        &app,
        Method::POST,
        uri,
        Some(json!({ "messages": [{ "id": "u1", "role": "user", "content": "Weather in Paris?" }] })),
    )
    .await;
    let lines = parse_stream(&body_text(response).await);
    let reply_id = lines[0].1["messageId"].as_str().unwrap().to_string();
    assert!(lines
        .iter()
        .any(|(p, v)| p == "9" && v["toolCallId"] == "w1" && v["toolName"] == "getWeatherInformation"));
    assert!(lines.iter().all(|(p, _)| p != "a"));

    let messages = history(&app, "bob").await.messages;
    assert_eq!(messages[1].id, reply_id);
    assert_eq!(messages[1].invocations[0].state.as_str(), "awaiting_confirmation");

    // Second request: the client re-sends its view of the chat and confirms.
    let response = send(
        &app,
        Method::POST,
        uri,
        Some(json!({ "messages": [
            { "id": "u1", "role": "user", "content": "Weather in Paris?" },
            {
                "id": reply_id,
                "role": "assistant",
                "content": "",
                "toolInvocations": [{
                    "toolCallId": "w1",
                    "toolName": "getWeatherInformation",
                    "args": { "city": "Paris" },
                    "state": "awaiting_confirmation"
                }]
            },
            { "id": "u2", "role": "user", "content": "confirm w1" }
        ] })),
    )
    .await;
    let lines = parse_stream(&body_text(response).await);
    assert_eq!(lines[0].0, "f");
    let (prefix, result) = &lines[1];
    assert_eq!(prefix, "a");
    assert_eq!(result["toolCallId"], "w1");
    assert!(result["result"].as_str().unwrap().starts_with("The weather in Paris is"));
    assert!(lines.iter().any(|(p, v)| p == "0" && v == "Good day for a viewing."));

    let messages = history(&app, "bob").await.messages;
    let invocation = &messages[1].invocations[0];
    assert_eq!(invocation.state.as_str(), "executed");
    assert!(invocation.result.is_some());
    assert_eq!(messages.len(), 4);
    assert_eq!(messages.iter().filter(|m| !m.invocations.is_empty()).count(), 1);

    // The model saw the executed result on the second generation.
    let requests = source.requests.lock().unwrap();
    let seen = &requests[1].messages[1].invocations[0];
    assert_eq!(seen.state.as_str(), "executed");
}

#[tokio::test]
async fn test_generation_failure_is_streamed_as_error() {
    let source = TurnScripts::new(vec![vec![
        Ok(GenerationEvent::TextDelta("Let me".into())),
        Err(PipelineError::GenerationFailure("upstream reset".into())),
    ]]);
    let app = create_test_app(source);

    let response = send(
        &app,
        Method::POST,
        "/agents/real-estate-agent/carol",
        Some(json!({ "messages": [{ "id": "u1", "role": "user", "content": "hello" }] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let lines = parse_stream(&body_text(response).await);
    let (prefix, message) = lines.last().unwrap();
    assert_eq!(prefix, "3");
    assert!(message.as_str().unwrap().contains("upstream reset"));

    // Only the user message is kept; the partial reply is not persisted.
    let messages = history(&app, "carol").await.messages;
    assert_eq!(messages.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Schedules and history
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_schedule_records_system_note() {
    let app = create_test_app(TurnScripts::new(vec![]));

    let response = send(
        &app,
        Method::POST,
        "/agents/real-estate-agent/dana/schedule",
        Some(json!({ "description": "follow up on the Montmartre viewing" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: ScheduleResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(accepted.session, "dana");

    let messages = history(&app, "dana").await.messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(
        messages[0].content,
        "Running scheduled task: follow up on the Montmartre viewing"
    );
}

#[tokio::test]
async fn test_schedule_requires_description() {
    let app = create_test_app(TurnScripts::new(vec![]));

    let response = send(
        &app,
        Method::POST,
        "/agents/real-estate-agent/dana/schedule",
        Some(json!({ "description": "   " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(error["error"].as_str().unwrap().contains("description is required"));
}

#[tokio::test]
async fn test_unknown_session_has_empty_history() {
    let app = create_test_app(TurnScripts::new(vec![]));

    let messages = history(&app, "nobody").await.messages;
    assert!(messages.is_empty());
}

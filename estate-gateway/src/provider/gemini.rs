//! Google Gemini generation source.
//!
//! Calls `streamGenerateContent?alt=sse` at the configured base URL, which
//! normally points at the AI gateway's `google-ai-studio` route. The API key
//! goes in `x-goog-api-key`; the gateway token in `cf-aig-authorization`.

use async_trait::async_trait;
use estate_agent::{
    FinishReason, GenerationEvent, GenerationRequest, GenerationSource, GenerationStream,
    InvocationState, Message, PipelineError, Role, ToolInvocation, Usage,
};
use estate_common::config::Config;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;

/// Gemini source.
pub struct GeminiSource {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    gateway_token: Option<String>,
    temperature: f64,
    max_output_tokens: i64,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

// ══════════════════════════════════════════════════════════════════════════════
// SOURCE
// ══════════════════════════════════════════════════════════════════════════════

impl GeminiSource {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            gateway_token: None,
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_gateway_token(mut self, token: impl Into<String>) -> Self {
        self.gateway_token = Some(token.into());
        self
    }

    pub fn with_generation(mut self, temperature: f64, max_output_tokens: i64) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Build from configuration. Fails when no base URL can be resolved.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base_url = config.model.base_url().ok_or_else(|| {
            anyhow::anyhow!(
                "No model endpoint: set model.base_url or both CLOUDFLARE_ACCOUNT_ID and CLOUDFLARE_AI_GATEWAY_ID"
            )
        })?;

        let mut source = Self::new(base_url, &config.model.model)
            .with_generation(config.model.temperature, config.model.max_output_tokens);
        if let Some(ref key) = config.secrets.google_ai_studio_token {
            source = source.with_api_key(key);
        }
        if let Some(ref token) = config.secrets.gateway_token {
            source = source.with_gateway_token(token);
        }
        if source.api_key.is_none() {
            tracing::warn!("GOOGLE_AI_STUDIO_TOKEN not set; relying on gateway-side credentials");
        }
        Ok(source)
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{model}:streamGenerateContent?alt=sse", self.base_url)
    }

    fn build_request(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let mut system = Vec::new();
        if let Some(ref prompt) = request.system {
            system.push(prompt.clone());
        }

        let mut contents = Vec::new();
        for message in &request.messages {
            match message.role {
                Role::System => system.push(message.content.clone()),
                Role::User => {
                    if !message.content.is_empty() {
                        contents.push(Content {
                            role: Some("user".into()),
                            parts: vec![Part::text(&message.content)],
                        });
                    }
                }
                Role::Assistant => contents.extend(assistant_contents(message)),
            }
        }

        let declarations: Vec<FunctionDeclaration> = request
            .tools
            .iter()
            .map(|spec| FunctionDeclaration {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            })
            .collect();
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: declarations,
            }]
        };

        GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::text(system.join("\n\n"))],
            }),
            tools,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

/// Model turn plus a user turn carrying one function response per call.
fn assistant_contents(message: &Message) -> Vec<Content> {
    let mut parts = Vec::new();
    if !message.content.is_empty() {
        parts.push(Part::text(&message.content));
    }
    for invocation in &message.invocations {
        parts.push(Part {
            function_call: Some(FunctionCall {
                name: invocation.tool_name.clone(),
                args: invocation.arguments.clone(),
            }),
            ..Part::default()
        });
    }
    if parts.is_empty() {
        return Vec::new();
    }

    let mut contents = vec![Content {
        role: Some("model".into()),
        parts,
    }];
    if !message.invocations.is_empty() {
        contents.push(Content {
            role: Some("user".into()),
            parts: message
                .invocations
                .iter()
                .map(|invocation| Part {
                    function_response: Some(FunctionResponse {
                        name: invocation.tool_name.clone(),
                        response: function_response(invocation),
                    }),
                    ..Part::default()
                })
                .collect(),
        });
    }
    contents
}

fn function_response(invocation: &ToolInvocation) -> serde_json::Value {
    match (invocation.state, &invocation.result) {
        (InvocationState::Executed, Some(result)) => json!({ "result": result }),
        (InvocationState::Errored, Some(result)) => json!({ "error": result }),
        (InvocationState::Rejected, _) => json!({ "error": "The user declined this tool call." }),
        (state, _) => json!({
            "status": state.as_str(),
            "note": format!("Ask the user to confirm with: confirm {}", invocation.id),
        }),
    }
}

fn finish_reason(raw: &str, saw_tool_call: bool) -> FinishReason {
    match raw {
        "STOP" if saw_tool_call => FinishReason::ToolCalls,
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Other,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// SSE DECODING
// ══════════════════════════════════════════════════════════════════════════════

type Event = Result<GenerationEvent, PipelineError>;

struct SseDecoder {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    pending: VecDeque<Event>,
    reason: Option<String>,
    usage: Usage,
    saw_tool_call: bool,
    done: bool,
}

impl SseDecoder {
    fn new(body: BoxStream<'static, Result<Vec<u8>, String>>) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            reason: None,
            usage: Usage::default(),
            saw_tool_call: false,
            done: false,
        }
    }

    fn fail(&mut self, message: String) {
        self.pending.push_back(Err(PipelineError::GenerationFailure(message)));
        self.done = true;
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            self.handle_line(&line);
            if self.done {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }

        let response: StreamResponse = match serde_json::from_str(data) {
            Ok(response) => response,
            Err(e) => return self.fail(format!("Failed to parse stream payload: {e}")),
        };
        if let Some(err) = response.error {
            return self.fail(format!("API error: {}", err.message));
        }

        if let Some(usage) = response.usage_metadata {
            self.usage = Usage {
                prompt_tokens: usage.prompt_token_count.unwrap_or(0),
                completion_tokens: usage.candidates_token_count.unwrap_or(0),
            };
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return;
        };
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                self.pending.push_back(Ok(GenerationEvent::TextDelta(text)));
            }
            if let Some(call) = part.function_call {
                self.saw_tool_call = true;
                let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                self.pending.push_back(Ok(GenerationEvent::ToolCall(ToolInvocation::proposed(
                    id, call.name, call.args,
                ))));
            }
        }
        if let Some(reason) = candidate.finish_reason {
            self.reason = Some(reason);
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim().to_string();
            self.handle_line(&line);
            if self.done {
                return;
            }
        }
        let reason = self
            .reason
            .as_deref()
            .map_or(FinishReason::Stop, |r| finish_reason(r, self.saw_tool_call));
        self.pending.push_back(Ok(GenerationEvent::Finish {
            reason,
            usage: self.usage,
        }));
        self.done = true;
    }

    fn into_stream(self) -> GenerationStream {
        futures_util::stream::unfold(self, |mut decoder| async move {
            loop {
                if let Some(event) = decoder.pending.pop_front() {
                    return Some((event, decoder));
                }
                if decoder.done {
                    return None;
                }
                match decoder.body.next().await {
                    Some(Ok(bytes)) => {
                        decoder.buffer.extend_from_slice(&bytes);
                        decoder.drain_lines();
                    }
                    Some(Err(e)) => decoder.fail(format!("Stream interrupted: {e}")),
                    None => decoder.finish(),
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
impl GenerationSource for GeminiSource {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationStream, PipelineError> {
        let body = self.build_request(&request);

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            http = http.header("x-goog-api-key", key);
        }
        if let Some(ref token) = self.gateway_token {
            http = http.header("cf-aig-authorization", format!("Bearer {token}"));
        }

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting Gemini generation"
        );

        let response = http
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailure(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailure(format!(
                "API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed();
        Ok(SseDecoder::new(body).into_stream())
    }
}

//! Configuration management for Estate services.
//!
//! The agent service reads a single configuration file at `~/.estate/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (applied by [`Config::apply_env_overrides`])
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ESTATE_GATEWAY_PORT` → gateway.port
//! - `ESTATE_BIND_ADDRESS` → gateway.host
//! - `ESTATE_LOG_LEVEL` → observability.log_level
//! - `GOOGLE_AI_MODEL` → model.model
//! - `GOOGLE_AI_STUDIO_TOKEN` → secrets.google_ai_studio_token
//! - `CLOUDFLARE_ACCOUNT_ID` → model.account_id
//! - `CLOUDFLARE_AI_GATEWAY_ID` → model.gateway_id
//! - `CLOUDFLARE_AI_GATEWAY_API_TOKEN` → secrets.gateway_token

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Base URL of the hosted AI gateway.
pub const AI_GATEWAY_BASE: &str = "https://gateway.ai.cloudflare.com/v1";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".estate"),
        |dirs| dirs.home_dir().join(".estate"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Gateway (HTTP surface)
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8787
}

// ============================================================================
// Model
// ============================================================================

/// Language model and AI gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Gateway provider slug (path segment after the gateway id)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier, e.g. "gemini-2.0-flash"
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum output tokens per generation
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i64,

    /// AI gateway account id
    #[serde(default)]
    pub account_id: Option<String>,

    /// AI gateway id
    #[serde(default)]
    pub gateway_id: Option<String>,

    /// Explicit provider base URL; bypasses gateway URL resolution when set
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            account_id: None,
            gateway_id: None,
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the provider base URL.
    ///
    /// An explicit `base_url` wins. Otherwise the URL is routed through the
    /// AI gateway, which needs both `account_id` and `gateway_id`.
    pub fn base_url(&self) -> Option<String> {
        if let Some(ref url) = self.base_url {
            return Some(url.trim_end_matches('/').to_string());
        }

        match (&self.account_id, &self.gateway_id) {
            (Some(account), Some(gateway)) if !account.is_empty() && !gateway.is_empty() => {
                Some(format!(
                    "{AI_GATEWAY_BASE}/{account}/{gateway}/{}/v1beta",
                    self.provider
                ))
            }
            _ => None,
        }
    }
}

fn default_provider() -> String {
    "google-ai-studio".into()
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> i64 {
    8192
}

// ============================================================================
// Secrets
// ============================================================================

/// Credentials. Never logged.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Google AI Studio API key
    #[serde(default)]
    pub google_ai_studio_token: Option<String>,

    /// AI gateway bearer token (`cf-aig-authorization`)
    #[serde(default)]
    pub gateway_token: Option<String>,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("google_ai_studio_token", &self.google_ai_studio_token.is_some())
            .field("gateway_token", &self.gateway_token.is_some())
            .finish()
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Agent behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name served under `/agents/{name}/...`
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// System prompt sent with every generation
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Upper bound for a single tool executor call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Outbound chunk buffer per streamed turn
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: None,
            tool_timeout_secs: default_tool_timeout_secs(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

fn default_agent_name() -> String {
    "real-estate-agent".into()
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_stream_buffer() -> usize {
    64
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Schedules
// ============================================================================

/// A recurring task delivered to one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    /// Target agent name
    #[serde(default = "default_agent_name")]
    pub agent: String,

    /// Target session id
    pub session: String,

    /// Cron expression with seconds field, e.g. "0 0 9 * * *"
    pub expression: String,

    /// Task description recorded in the conversation
    pub description: String,
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("ESTATE_GATEWAY_PORT") {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid ESTATE_GATEWAY_PORT"),
            }
        }
        if let Some(bind) = lookup("ESTATE_BIND_ADDRESS") {
            self.gateway.host = bind;
        }
        if let Some(level) = lookup("ESTATE_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(model) = lookup("GOOGLE_AI_MODEL") {
            self.model.model = model;
        }
        if let Some(account) = lookup("CLOUDFLARE_ACCOUNT_ID") {
            self.model.account_id = Some(account);
        }
        if let Some(gateway) = lookup("CLOUDFLARE_AI_GATEWAY_ID") {
            self.model.gateway_id = Some(gateway);
        }

        if let Some(token) = lookup("GOOGLE_AI_STUDIO_TOKEN") {
            self.secrets.google_ai_studio_token = Some(token);
        }
        if let Some(token) = lookup("CLOUDFLARE_AI_GATEWAY_API_TOKEN") {
            self.secrets.gateway_token = Some(token);
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}

//! Generation sources backed by hosted model APIs.

mod gemini;

pub use gemini::GeminiSource;

use estate_agent::GenerationSource;
use estate_common::config::Config;
use std::sync::Arc;

/// Build the configured generation source.
pub fn create_source(config: &Config) -> anyhow::Result<Arc<dyn GenerationSource>> {
    match config.model.provider.as_str() {
        "google-ai-studio" => Ok(Arc::new(GeminiSource::from_config(config)?)),
        other => anyhow::bail!("Unsupported model provider: {other}"),
    }
}

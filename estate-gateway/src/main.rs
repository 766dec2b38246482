//! Estate Gateway - Main entry point.

use anyhow::Result;
use estate_common::config::Config;
use estate_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Estate Gateway v{}", env!("CARGO_PKG_VERSION"));

    estate_gateway::start_server(&config).await
}

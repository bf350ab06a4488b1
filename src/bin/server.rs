//! `murmur-server`: HTTP front end for the suggestion service.
//!
//! Configuration comes from `$MURMUR_CONFIG` or `<config dir>/murmur/config.toml`,
//! overridden by environment variables (`GOOGLE_API_KEY`, `GEMINI_MODEL`, ...).
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::sync::Arc;

use murmur::backend::{GeminiBackend, GenerationBackend};
use murmur::{ModelCatalog, MurmurConfig, SuggestServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = MurmurConfig::load().map_err(|e| anyhow::anyhow!("loading config: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config: {e}"))?;

    let backend: Arc<dyn GenerationBackend> =
        Arc::new(GeminiBackend::new(config.provider.gemini()));
    tracing::info!(
        backend = backend.name(),
        model = config.provider.requested_model().unwrap_or("auto"),
        default_count = config.suggestions.default_count,
        "murmur-server starting"
    );

    let server = SuggestServer::start(backend, ModelCatalog::global().clone(), &config)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "murmur-server failed to start");
            anyhow::anyhow!("murmur-server failed: {e}")
        })?;

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    tracing::info!("murmur-server shut down cleanly");
    Ok(())
}

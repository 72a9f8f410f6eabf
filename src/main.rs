// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use sigma_embed::{
    api::{start_server, AppState},
    config::ServiceConfig,
    embeddings::ModelHandle,
    version,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting {}", version::get_version_string());

    let config = ServiceConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    info!("Embedding model: {}", config.model);
    info!("Models directory: {}", config.models_dir.display());

    // The listener is only bound once the model is ready
    let model = ModelHandle::load(&config.model_config())
        .await
        .context("Embedding model initialization failed")?;

    let addr = config.bind_addr();
    info!("API Endpoints:");
    info!("  Health:       GET  http://{}/health", addr);
    info!("  Embed:        POST http://{}/embed", addr);
    info!("  Embed batch:  POST http://{}/embed/batch", addr);

    start_server(addr, AppState::new(model)).await
}

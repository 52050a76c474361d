//! Vantage HTTP server.
//!
//! Thin shell over the audit crates: builds the shared state from
//! configuration, mounts the audit API and serves it. Core logic lives in
//! the `crates/` directory.

pub mod api;
pub mod error;
pub mod state;

pub use api::router;
pub use error::ApiError;
pub use state::AppState;

use anyhow::Context;
use tracing::info;
use vantage_core::AppConfig;

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vantage=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Build the state from `config` and serve until the process is stopped.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting Vantage v{}", env!("CARGO_PKG_VERSION"));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

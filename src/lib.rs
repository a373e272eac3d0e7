//! SolarSentinel -- anomaly detection and root-cause analysis for PV plant telemetry.
//!
//! This crate provides the detection engine (statistical, digital-twin and data-gap
//! detectors), root-cause analysis, SQLite persistence, and the HTTP API.

pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod rca;
pub mod storage;
pub mod telemetry;

use anyhow::{Context, Result};

/// Start the SolarSentinel daemon: open storage and serve the API.
pub async fn serve(config: &config::SentinelConfig) -> Result<()> {
    let db_path = config.storage.database_path.display().to_string();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    let state = api::state::AppState::from_pool(pool, &config.detection);
    let app = api::router(state);

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    tracing::info!(%addr, "SolarSentinel listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("SolarSentinel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

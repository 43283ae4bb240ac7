//! surgewatch -- real-time request-traffic anomaly detection.
//!
//! This crate provides the in-memory detector that turns a stream of
//! per-request events into rolling traffic snapshots and rate-limited
//! alerts, plus an axum host layer that feeds it from live HTTP traffic.

pub mod api;
pub mod config;
pub mod detect;
pub mod simulate;

use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::detect::Detector;

/// Start the surgewatch daemon: detector plus HTTP API.
pub async fn serve(config: AppConfig) -> Result<()> {
    let detector = Detector::new(config.detector.clone())?;

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(AppState::new(detector, config));

    tracing::info!(%addr, "surgewatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("surgewatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

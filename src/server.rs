//! HTTP endpoint for metrics and health
//!
//! Two routes only: `GET /metrics` renders the Prometheus text exposition
//! from the metrics sink, `GET /healthz` answers "ok" while the process is
//! up. The janitor loop runs as a background task next to this server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::metrics::MetricsSink;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn build_router(metrics: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics)
}

/// Bind and serve until the process exits.
pub async fn serve(bind: SocketAddr, metrics: Arc<MetricsSink>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("serving metrics on http://{bind}/metrics");

    axum::serve(listener, build_router(metrics))
        .await
        .context("HTTP server failed")
}

async fn metrics_handler(State(metrics): State<Arc<MetricsSink>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        metrics.render(),
    )
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

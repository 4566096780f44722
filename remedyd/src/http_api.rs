//! HTTP API for metrics and status endpoints.
//!
//! Provides:
//! - `/metrics` - Prometheus metrics export
//! - `/health` - Basic daemon health check
//! - `/status` - Scheduler state and the last cycle summary
//! - `/records` - Remediation records as of the last cycle

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::sync::watch;

use crate::metrics::RemedyMetrics;
use crate::status::StatusBoard;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub metrics: Arc<RemedyMetrics>,
    pub status: StatusBoard,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
    /// Daemon PID.
    pub pid: u32,
}

pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/records", get(records_handler))
        .with_state(Arc::new(state))
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn status_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.status.snapshot())
}

/// Served from the status board copy; never touches the scheduler's map.
async fn records_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.status.records())
}

/// Bind `addr` and serve until `true` is sent on `shutdown`.
///
/// Binding happens before this returns so a busy port is reported at
/// startup rather than from inside the spawned task.
pub async fn start_server(
    addr: SocketAddr,
    state: HttpState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<tokio::task::JoinHandle<std::io::Result<()>>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let router = create_router(state);

    tracing::info!("Serving metrics and status on http://{}", listener.local_addr()?);

    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }))
}

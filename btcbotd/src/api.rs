//! Health and metrics listener.
//!
//! - `GET /healthz`: `200 ok` while the loop runs, `503 shutting_down` once
//!   shutdown has begun. A single failed cycle does not flip it.
//! - `GET /metrics`: Prometheus text exposition.
//!
//! Anything else is a 404.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{DaemonError, DaemonResult};
use crate::metrics::RuntimeMetrics;

/// Content type of the text exposition format.
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// API State
// =============================================================================

/// Shared state for handlers: the loop's stop flag and its metrics.
#[derive(Clone)]
pub struct ApiState {
    pub shutdown: CancellationToken,
    pub metrics: RuntimeMetrics,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port` and serve until `stop` is cancelled. Returns the bound
/// address (useful with port 0).
pub async fn start_api_server(
    host: &str,
    port: u16,
    state: ApiState,
    stop: CancellationToken,
) -> DaemonResult<SocketAddr> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;

    let router = create_router(state);
    tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            stop.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "API server error");
        }
    });

    Ok(local_addr)
}

// =============================================================================
// Handlers
// =============================================================================

async fn healthz_handler(State(state): State<ApiState>) -> Response {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down").into_response()
    } else {
        (StatusCode::OK, "ok").into_response()
    }
}

async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

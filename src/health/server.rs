use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::state::LivenessState;

async fn healthz(State(liveness): State<Arc<LivenessState>>) -> impl IntoResponse {
    if liveness.is_healthy() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
    }
}

pub fn make_app(liveness: Arc<LivenessState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(liveness)
}

/// Serve `/healthz` on all interfaces until cancelled
pub async fn run_health_server(
    port: u16,
    liveness: Arc<LivenessState>,
    cancellation: CancellationToken,
) -> Result<()> {
    let app = make_app(liveness);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind health endpoint on port {}", port))?;
    info!("Health endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancellation.cancelled_owned())
        .await?;
    Ok(())
}

//! `GET /health` over axum

use crate::health::{HealthSnapshot, HealthState, HealthStatus};
use crate::queue::{JobQueue, QueueCounts};
use crate::state::Lane;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthState>,
    pub queue: Arc<JobQueue>,
}

#[derive(Debug, Serialize)]
struct LaneCounts {
    crawl: QueueCounts,
    processing: QueueCounts,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    snapshot: HealthSnapshot,

    /// Absent when the queue store could not be read
    queue: Option<LaneCounts>,
    timestamp: String,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut snapshot = state.health.snapshot();

    let queue = match (
        state.queue.counts(Lane::Crawl),
        state.queue.counts(Lane::Processing),
    ) {
        (Ok(crawl), Ok(processing)) => Some(LaneCounts { crawl, processing }),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Health check could not read queue counts");
            snapshot.status = HealthStatus::Unhealthy;
            None
        }
    };

    let code = snapshot.status.status_code();
    let body = HealthResponse {
        snapshot,
        queue,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (code, Json(body))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves the health endpoint until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Health endpoint listening on http://{}/health", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::debug!("Health endpoint stopped");
    Ok(())
}

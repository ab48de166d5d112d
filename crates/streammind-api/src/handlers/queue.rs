//! Queue introspection and administration.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use streammind_worker::PoolStatus;

use crate::state::AppState;

/// `GET /api/videos/queue/status`
pub async fn queue_status(State(state): State<AppState>) -> Json<PoolStatus> {
    Json(state.pool.status())
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
    pub removed: usize,
}

/// `DELETE /admin/queue` - drop every pending job. Jobs already claimed by a
/// worker are unaffected.
pub async fn drain_queue(State(state): State<AppState>) -> Json<DrainResponse> {
    let removed = state.queue.drain();
    info!(removed, "Drained job queue");
    Json(DrainResponse { removed })
}

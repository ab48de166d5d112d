//! Notifications from the signaling service.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use streammind_models::SessionId;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

/// `POST /internal/session/connected`
pub async fn session_connected(
    State(state): State<AppState>,
    Json(event): Json<SessionEvent>,
) -> ApiResult<Json<AckResponse>> {
    let session_id = SessionId::parse(&event.session_id)?;
    info!(
        session_id = %session_id,
        timestamp = event.timestamp,
        live_subscribers = state.hub.subscriber_count(&session_id),
        "Session connected"
    );
    Ok(Json(AckResponse { status: "ok" }))
}

/// `POST /internal/session/disconnected`
pub async fn session_disconnected(
    State(state): State<AppState>,
    Json(event): Json<SessionEvent>,
) -> ApiResult<Json<AckResponse>> {
    let session_id = SessionId::parse(&event.session_id)?;
    info!(
        session_id = %session_id,
        timestamp = event.timestamp,
        queued_jobs = state.queue.len(),
        "Session disconnected"
    );
    Ok(Json(AckResponse { status: "ok" }))
}

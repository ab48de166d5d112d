//! Live analysis WebSocket.
//!
//! One connection per (consumer, session). The server pushes raw token
//! content as text frames; anything the client sends is ignored apart from
//! close frames.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::time::interval;
use tracing::{debug, info, warn};

use streammind_models::SessionId;

use crate::error::ApiResult;
use crate::hub::Subscriber;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const ENDPOINT: &str = "analysis";

/// `GET /ws/analysis/:session_id`
pub async fn ws_analysis(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session_id = SessionId::parse(&session_id)?;

    // Counted only once the upgrade has actually happened.
    Ok(ws.on_upgrade(move |socket| async move {
        let _connection = ConnectionGuard::open();
        handle_analysis_socket(socket, state, session_id).await;
    }))
}

/// Holds one slot of the active connection gauge.
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_ws_active_connections(count);
        metrics::record_ws_connection(ENDPOINT);
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    }
}

async fn handle_analysis_socket(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (mut sender, mut receiver) = socket.split();

    let (subscriber, mut tokens) = Subscriber::channel(state.config.ws_send_buffer);
    let subscriber_id = state.hub.subscribe(session_id, subscriber);
    info!(session_id = %session_id, subscriber_id, "Live analysis connection opened");

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            token = tokens.recv() => {
                let Some(content) = token else {
                    // The hub dropped our sender: we were evicted.
                    warn!(session_id = %session_id, subscriber_id, "Live subscriber evicted, closing");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if sender.send(Message::Text(content)).await.is_err() {
                    debug!(session_id = %session_id, "WebSocket send failed, client disconnected");
                    break;
                }
                last_activity = Instant::now();
                metrics::record_ws_message_sent(ENDPOINT, "token");
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                    && sender.send(Message::Ping(Vec::new())).await.is_err()
                {
                    debug!(session_id = %session_id, "Heartbeat failed, client disconnected");
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Pong(_))) => last_activity = Instant::now(),
                    Some(Ok(_)) => metrics::record_ws_message_received(ENDPOINT),
                }
            }
        }
    }

    state.hub.unsubscribe(&session_id, subscriber_id);
    info!(session_id = %session_id, subscriber_id, "Live analysis connection closed");
}

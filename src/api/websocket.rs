//! WebSocket Support for Real-time Game Events
//!
//! One socket per topic: a client subscribes to a payment hash or a
//! session id and receives that topic's events as JSON frames, in publish
//! order. Delivery is at-most-once; a subscriber that falls behind has its
//! oldest frames dropped rather than stalling the games.

use super::handlers::AppState;
use crate::hub::GameEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// WebSocket endpoint handler
/// GET /api/v1/ws/{topic}
pub async fn topic_websocket_handler(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Subscribe before the upgrade completes so events fired while the
    // handshake is in flight are not lost.
    let rx = state.hub.subscribe(&topic);
    ws.on_upgrade(move |socket| handle_topic_connection(socket, topic, rx, state))
}

/// Handle individual WebSocket connection
async fn handle_topic_connection(
    socket: WebSocket,
    topic: String,
    mut rx: broadcast::Receiver<GameEvent>,
    state: Arc<AppState>,
) {
    let client_id = generate_client_id();
    let connected = state.metrics.ws_connected();
    info!(
        "🔌 WebSocket client {} subscribed to '{}' (total: {})",
        client_id, topic, connected
    );

    let (mut sender, mut receiver) = socket.split();

    // Confirmation frame before any event
    let welcome = serde_json::json!({ "type": "subscribed", "topic": topic });
    if sender
        .send(Message::Text(welcome.to_string()))
        .await
        .is_err()
    {
        state.metrics.ws_disconnected();
        return;
    }

    // Task to drain incoming frames; clients only ever send close/pong
    let client_id_recv = client_id.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("client {} requested close", client_id_recv);
                    break;
                }
                Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from client {}: {}", client_id_recv, e);
                    break;
                }
            }
        }
    });

    // Task to forward topic events to the client
    let metrics = state.metrics.clone();
    let client_id_send = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        debug!("client {} disconnected", client_id_send);
                        break;
                    }
                    metrics.record_ws_message();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "client {} lagged, {} events dropped",
                        client_id_send, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Whichever side finishes tears down the other, which also drops the
    // topic subscription so the hub can reap it.
    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    let remaining = state.metrics.ws_disconnected();
    info!(
        "🔌 WebSocket client {} left '{}' (remaining: {})",
        client_id, topic, remaining
    );
}

/// Generate unique client ID
fn generate_client_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

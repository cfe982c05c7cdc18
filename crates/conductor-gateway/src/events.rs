//! `GET /events`: engine events streamed over a WebSocket.

use crate::server::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    // Subscribe before greeting so nothing published after the greeting is missed.
    let mut events = state.orchestrator.events().subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    info!(connection_id = %connection_id, "Event stream connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "connectionId": connection_id,
    });
    if ws_sender
        .send(Message::Text(welcome.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, skipped, "Event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(event = event.name(), error = %e, "Failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; the loop only watches for the close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => debug!(connection_id = %connection_id, ?other, "Ignoring inbound frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!(connection_id = %connection_id, "Event stream disconnected");
}

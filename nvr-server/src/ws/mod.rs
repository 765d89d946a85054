//! WebSocket stream of bus events
//!
//! Each connection gets its own fanout queue. Clients may narrow the stream
//! at any time with `{"type": "set_filter", "event_types": [...], "cameras": [...]}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use nvr_core::events::{ClientFilter, StreamMessage};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::http::StreamQuery;

/// Client-to-server messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetFilter {
        #[serde(default)]
        event_types: Vec<String>,
        #[serde(default)]
        cameras: Vec<String>,
    },
}

/// Server-to-client acknowledgement or error
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Connected { client_id: u64 },
    FilterUpdated,
    Error { message: String },
}

/// WebSocket upgrade handler
pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.filter()))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: ClientFilter) {
    let (mut sender, mut receiver) = socket.split();
    let fanout = state.manager.fanout().clone();
    let mut client = fanout.connect(filter);
    let client_id = client.id();
    tracing::debug!(client = client_id, "WebSocket client connected");

    if let Err(e) = send_json(&mut sender, &ControlMessage::Connected { client_id }).await {
        tracing::warn!(client = client_id, error = %e, "WebSocket send failed");
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::SetFilter { event_types, cameras }) => {
                                fanout.set_filter(client_id, ClientFilter { event_types, cameras });
                                ControlMessage::FilterUpdated
                            }
                            Err(e) => ControlMessage::Error { message: format!("invalid message: {e}") },
                        };
                        if let Err(e) = send_json(&mut sender, &reply).await {
                            tracing::warn!(client = client_id, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client = client_id, error = %e, "WebSocket receive failed");
                        break;
                    }
                    _ => {}
                }
            }

            event = client.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = send_json(&mut sender, &StreamMessage::event(&event)).await {
                    tracing::warn!(client = client_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
        }
    }

    tracing::debug!(client = client_id, dropped = client.dropped(), "WebSocket client disconnected");
}

/// Helper to serialize and send a JSON message
async fn send_json<S, T>(sender: &mut S, msg: &T) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
    T: Serialize,
{
    let json = serde_json::to_string(msg).map_err(|e| format!("Serialize error: {e}"))?;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| format!("Send error: {e}"))
}

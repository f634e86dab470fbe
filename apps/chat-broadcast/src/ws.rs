//! WebSocket subscription surface (C9, exposed over WS).
//!
//! One client connection maps to one [`ConnectionId`]. `joinScope`/`leaveScope`
//! client frames register/deregister the connection's sink in the shared
//! [`SubscriptionRegistry`]; events delivered to that sink are forwarded to the
//! client as `event` frames. Presence is tied to the connection's lifetime:
//! `set_online` on upgrade, `set_offline` on close (best-effort, see
//! `chatify-presence`).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chatify_core::{scope_key, ChatEvent, ConnectionId, ScopeType};
use chatify_presence::SharedPresenceStore;
use chatify_subscriptions::{new_sink, SubscriptionRegistry};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SENDER_HEADER: &str = "x-sender-id";

#[derive(Clone)]
pub struct BroadcastState {
    pub registry: Arc<SubscriptionRegistry>,
    pub presence: SharedPresenceStore,
    pub replica_id: String,
}

pub fn build_router(state: BroadcastState) -> Router {
    Router::new()
        .route("/v1/subscribe", get(subscribe))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(state))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinScope { scope_type: ScopeType, scope_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveScope { scope_type: ScopeType, scope_id: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerMessage<'a> {
    #[serde(rename_all = "camelCase")]
    ReceiveMessage { event: &'a ChatEvent },
    #[serde(rename_all = "camelCase")]
    ReceiveError { message: String },
}

async fn subscribe(
    State(state): State<Arc<BroadcastState>>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let sender_id = headers
        .get(SENDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    ws.on_upgrade(move |socket| handle_connection(socket, state, sender_id))
}

async fn handle_connection(socket: WebSocket, state: Arc<BroadcastState>, sender_id: String) {
    let connection_id = ConnectionId(nanoid::nanoid!());
    if let Err(err) = state
        .presence
        .set_online(&sender_id, &connection_id.0, &state.replica_id)
        .await
    {
        warn!(error = %err, connection_id = %connection_id, "failed to record presence on connect");
    }

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = new_sink();

    let registry = state.registry.clone();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let frame = ServerMessage::ReceiveMessage { event: &event };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            message = stream.next() => {
                let Some(Ok(message)) = message else { break };
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::JoinScope { scope_type, scope_id }) => {
                                let key = scope_key(scope_type, &scope_id);
                                registry.subscribe(connection_id.clone(), &key, tx.clone());
                            }
                            Ok(ClientMessage::LeaveScope { scope_type, scope_id }) => {
                                let key = scope_key(scope_type, &scope_id);
                                registry.unsubscribe(&connection_id, &key);
                            }
                            Err(err) => {
                                warn!(error = %err, connection_id = %connection_id, "rejected malformed subscription frame");
                                if sink.send(Message::Text(error_frame(format!("malformed subscription frame: {err}")).into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.drop_connection(&connection_id);
    if let Err(err) = state.presence.set_offline(&sender_id, &connection_id.0).await {
        warn!(error = %err, connection_id = %connection_id, "failed to clear presence on disconnect");
    }
    info!(connection_id = %connection_id, sender_id = %sender_id, "subscription connection closed");
}

/// Serializes a `ReceiveError` frame sent back to the client that sent a
/// malformed subscription control frame.
fn error_frame(message: impl Into<String>) -> String {
    serde_json::to_string(&ServerMessage::ReceiveError { message: message.into() })
        .unwrap_or_default()
}

//! `/chats`: per-user chat list over WebSocket.
//!
//! Each `{"user_id": <int>}` request is answered with the latest message of
//! every chat that user wrote in. These sockets never join the broadcast
//! registry.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use messenger_common::id::{prefix, prefixed_ulid};
use serde_json::Value;

use crate::AppState;

use super::connection::{ClientSink, WsSink};
use super::envelope::integer;
use super::events::ErrorEnvelope;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let sink = WsSink::new(ws_tx, state.config.write_timeout);
    let conn_id = prefixed_ulid(prefix::CHAT_LIST);

    tracing::debug!(%conn_id, "chat list connection opened");

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(%conn_id, %err, "ws read error");
                break;
            }
        };

        let reply = match chat_list(&state, text.as_str()).await {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(%conn_id, %error, "chat list request failed");
                ErrorEnvelope::new(error).to_json()
            }
        };

        if let Err(err) = sink.send_text(&reply).await {
            tracing::debug!(%conn_id, %err, "chat list write failed");
            break;
        }
    }

    sink.close().await;
    tracing::debug!(%conn_id, "chat list connection closed");
}

async fn chat_list(state: &AppState, text: &str) -> Result<String, String> {
    let request: Value = serde_json::from_str(text).map_err(|_| "invalid request".to_string())?;
    let user_id = integer(request.get("user_id")).ok_or_else(|| "invalid user_id".to_string())?;

    let chats = state
        .repo
        .load_user_chats(user_id)
        .await
        .map_err(|err| format!("error fetching chats: {err}"))?;

    serde_json::to_string(&chats).map_err(|err| format!("error encoding chats: {err}"))
}

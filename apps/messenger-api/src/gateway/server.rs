//! WebSocket upgrade handler and connection lifecycle for `/chat`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;

use crate::AppState;

use super::connection::{ClientSink, ConnectionId, WsSink};
use super::dispatch::Termination;
use super::registry::ConnectionRegistry;

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", get(ws_upgrade))
}

/// Requests that are not valid upgrades are rejected by the extractor before
/// anything is registered.
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_failed_upgrade(|err| tracing::warn!(%err, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let sink: Arc<dyn ClientSink> = Arc::new(WsSink::new(ws_tx, state.config.write_timeout));
    let dispatcher = state.dispatcher.clone();

    supervise(&state.registry, ConnectionId::new(), sink, move |conn_id, sink| async move {
        dispatcher.run(&conn_id, sink.as_ref(), ws_rx).await
    })
    .await;
}

/// Register the connection, run its dispatch loop to completion, then
/// deregister it.
///
/// The loop runs on its own task so that a panic inside it still reaches the
/// release below. If this future is itself dropped, the registration guard
/// deregisters on drop. Returns `None` when the loop panicked.
pub(crate) async fn supervise<F, Fut>(
    registry: &Arc<ConnectionRegistry>,
    conn_id: ConnectionId,
    sink: Arc<dyn ClientSink>,
    dispatch: F,
) -> Option<Termination>
where
    F: FnOnce(ConnectionId, Arc<dyn ClientSink>) -> Fut,
    Fut: Future<Output = Termination> + Send + 'static,
{
    let registration = registry.register(conn_id.clone(), Arc::clone(&sink));

    tracing::info!(
        conn_id = %conn_id,
        connections = registry.len(),
        "chat connection opened"
    );

    let task = tokio::spawn(dispatch(conn_id.clone(), sink));

    let termination = match task.await {
        Ok(termination) => Some(termination),
        Err(err) => {
            tracing::error!(conn_id = %conn_id, %err, "dispatch loop aborted");
            None
        }
    };

    registration.release().await;

    tracing::info!(
        conn_id = %conn_id,
        ?termination,
        connections = registry.len(),
        "chat connection closed"
    );

    termination
}

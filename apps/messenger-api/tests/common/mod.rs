#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use messenger_api::config::Config;
use messenger_api::db::memory::MemoryRepository;
use messenger_api::models::message::Message;
use messenger_api::AppState;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build an `AppState` over an in-memory repository and start its broadcast
/// worker. The repository handle is returned for seeding and assertions.
pub fn test_state() -> (AppState, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let config = Config {
        broadcast_queue_capacity: 64,
        write_timeout: Duration::from_secs(2),
        ..Config::default()
    };
    let (state, worker) = AppState::new(config, repo.clone());
    tokio::spawn(worker.run());
    (state, repo)
}

/// Start an actual TCP server for WebSocket testing on an ephemeral port.
pub async fn start_server() -> (SocketAddr, AppState, Arc<MemoryRepository>) {
    let (state, repo) = test_state();
    let app = messenger_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, repo)
}

pub async fn connect(addr: SocketAddr, path: &str) -> Client {
    let url = format!("ws://{addr}{path}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Wait until the registry holds exactly `n` connections. The upgrade
/// handshake completes before the server side registers, so tests that rely
/// on fan-out reaching a client must wait for it.
pub async fn wait_for_connections(state: &AppState, n: usize) {
    time::timeout(Duration::from_secs(5), async {
        while state.registry.len() != n {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} connections, have {}", state.registry.len()));
}

pub async fn send_json(ws: &mut Client, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame decoded as JSON, skipping control frames.
pub async fn next_json(ws: &mut Client) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("parse frame");
        }
    }
}

/// Assert that nothing but control frames arrives within `wait`.
pub async fn assert_silent(ws: &mut Client, wait: Duration) {
    let result = time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;

    if let Ok(Some(text)) = result {
        panic!("expected no frame, got {text}");
    }
}

/// Client-side message body in the inbound wire casing.
pub fn message_body(id: i64, chat_id: i64, author_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "MessageId": id,
        "AuthorId": author_id,
        "Timestamp": 1_700_000_000 + id,
        "ReceiverId": 99,
        "Message": text,
        "ChatId": chat_id,
        "IsEdited": false,
    })
}

pub fn stored_message(id: i64, chat_id: i64, author_id: i64, receiver_id: i64, text: &str) -> Message {
    Message {
        message_id: id,
        author_id,
        timestamp: DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap(),
        receiver_id,
        message: text.to_string(),
        chat_id,
        is_edited: false,
        parent_message_id: None,
    }
}

mod common;

use std::time::Duration;

use futures_util::SinkExt;
use messenger_api::db::repository::MessageRepository;
use serde_json::json;
use tokio_tungstenite::tungstenite;

use common::{assert_silent, connect, message_body, next_json, send_json, start_server, wait_for_connections};

// ---------------------------------------------------------------------------
// /chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initial_returns_chat_history_in_order() {
    let (addr, state, repo) = start_server().await;
    repo.save_message(&common::stored_message(2, 42, 1, 2, "second"))
        .await
        .unwrap();
    repo.save_message(&common::stored_message(1, 42, 2, 1, "first"))
        .await
        .unwrap();
    repo.save_message(&common::stored_message(3, 7, 1, 2, "other chat"))
        .await
        .unwrap();

    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;

    send_json(&mut a, json!({ "type": "initial", "chat_id": 42 })).await;
    let initial = next_json(&mut a).await;

    assert_eq!(initial["type"], "initial");
    let texts: Vec<&str> = initial["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["first", "second"]);

    // History is never broadcast.
    assert_silent(&mut b, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn initial_for_empty_chat_is_empty_array() {
    let (addr, _state, _repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;

    send_json(&mut a, json!({ "type": "initial", "chat_id": 1 })).await;
    let initial = next_json(&mut a).await;

    assert_eq!(initial, json!({ "type": "initial", "messages": [] }));
}

#[tokio::test]
async fn message_is_broadcast_to_every_client_including_sender() {
    let (addr, state, repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;

    send_json(
        &mut a,
        json!({ "type": "message", "message": message_body(11, 42, 1, "hello") }),
    )
    .await;

    for client in [&mut a, &mut b] {
        let event = next_json(client).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["message"]["message_id"], 11);
        assert_eq!(event["message"]["chat_id"], 42);
        assert_eq!(event["message"]["message"], "hello");
        assert!(event["message"]["parent_message_id"].is_null());
    }

    assert_eq!(repo.load_messages(42).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reply_is_broadcast_with_parent() {
    let (addr, state, repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;
    repo.save_message(&common::stored_message(11, 42, 2, 1, "hello"))
        .await
        .unwrap();

    let mut body = message_body(12, 42, 1, "re: hello");
    body["ParentMessageId"] = json!(11);
    send_json(&mut a, json!({ "type": "message_reply", "message": body })).await;

    let event = next_json(&mut b).await;
    assert_eq!(event["type"], "message_reply");
    assert_eq!(event["message"]["parent_message_id"], 11);

    let stored = repo.load_messages(42).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].parent_message_id, Some(11));
}

#[tokio::test]
async fn reply_missing_parent_is_rejected_and_not_broadcast() {
    let (addr, state, repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;

    send_json(
        &mut a,
        json!({ "type": "message_reply", "message": message_body(13, 42, 1, "orphan") }),
    )
    .await;

    let error = next_json(&mut a).await;
    assert!(
        error["error"].as_str().unwrap().contains("ParentMessageId"),
        "{error}"
    );
    assert!(repo.is_empty());
    assert_silent(&mut b, Duration::from_millis(200)).await;

    // The connection stays usable after a bad request.
    send_json(&mut a, json!({ "type": "initial", "chat_id": 42 })).await;
    assert_eq!(next_json(&mut a).await["type"], "initial");
}

#[tokio::test]
async fn unknown_type_and_invalid_json_get_error_replies() {
    let (addr, _state, _repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;

    send_json(&mut a, json!({ "type": "typing" })).await;
    assert_eq!(next_json(&mut a).await["error"], "invalid message type");

    a.send(tungstenite::Message::Text("{not json".into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut a).await["error"], "invalid message type");

    send_json(&mut a, json!({ "type": "initial", "chat_id": "abc" })).await;
    assert_eq!(next_json(&mut a).await["error"], "invalid chat_id");
}

#[tokio::test]
async fn persistence_failure_is_reported_and_not_broadcast() {
    let (addr, state, repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;
    repo.set_failing(true);

    send_json(
        &mut a,
        json!({ "type": "message", "message": message_body(14, 42, 1, "lost") }),
    )
    .await;

    let error = next_json(&mut a).await;
    assert!(error["error"]
        .as_str()
        .unwrap()
        .starts_with("error saving message"));
    assert_silent(&mut b, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn disconnected_client_is_dropped_and_broadcasts_continue() {
    let (addr, state, _repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;

    b.close(None).await.unwrap();
    drop(b);
    wait_for_connections(&state, 1).await;

    send_json(
        &mut a,
        json!({ "type": "message", "message": message_body(15, 42, 1, "still here") }),
    )
    .await;

    let event = next_json(&mut a).await;
    assert_eq!(event["message"]["message_id"], 15);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn removed_connection_stops_dispatching() {
    let (addr, state, repo) = start_server().await;
    let mut a = connect(addr, "/chat").await;
    wait_for_connections(&state, 1).await;
    let a_id = state.registry.snapshot()[0].0.clone();

    let mut b = connect(addr, "/chat").await;
    wait_for_connections(&state, 2).await;
    let b_id = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(id, _)| id)
        .find(|id| *id != a_id)
        .unwrap();

    // Same path the broadcast worker takes after a failed write.
    state.registry.remove(&b_id).await;
    wait_for_connections(&state, 1).await;

    let _ = b
        .send(tungstenite::Message::Text(
            json!({ "type": "message", "message": message_body(16, 42, 2, "too late") })
                .to_string()
                .into(),
        ))
        .await;

    assert_silent(&mut a, Duration::from_millis(300)).await;
    assert!(repo.is_empty());
    assert!(state.registry.contains(&a_id));
}

#[tokio::test]
async fn abrupt_disconnect_is_deregistered() {
    let (addr, state, _repo) = start_server().await;
    let a = connect(addr, "/chat").await;
    wait_for_connections(&state, 1).await;

    drop(a);
    wait_for_connections(&state, 0).await;
}

// ---------------------------------------------------------------------------
// /chats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_list_returns_latest_message_per_chat() {
    let (addr, state, repo) = start_server().await;
    repo.add_user(2, "bob");
    repo.save_message(&common::stored_message(1, 10, 1, 2, "old"))
        .await
        .unwrap();
    repo.save_message(&common::stored_message(2, 10, 1, 2, "new"))
        .await
        .unwrap();
    repo.save_message(&common::stored_message(3, 20, 1, 3, "elsewhere"))
        .await
        .unwrap();
    repo.save_message(&common::stored_message(4, 30, 5, 1, "not mine"))
        .await
        .unwrap();

    let mut ws = connect(addr, "/chats").await;
    send_json(&mut ws, json!({ "user_id": 1 })).await;
    let chats = next_json(&mut ws).await;

    let chats = chats.as_array().unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0]["chat_id"], 20);
    assert_eq!(chats[0]["message_content"], "elsewhere");
    assert!(chats[0]["message_receiver_username"].is_null());
    assert_eq!(chats[1]["chat_id"], 10);
    assert_eq!(chats[1]["message_content"], "new");
    assert_eq!(chats[1]["message_receiver_username"], "bob");

    // Chat list sockets never join the broadcast registry.
    assert_eq!(state.registry.len(), 0);
}

#[tokio::test]
async fn chat_list_rejects_bad_requests() {
    let (addr, _state, _repo) = start_server().await;
    let mut ws = connect(addr, "/chats").await;

    send_json(&mut ws, json!({ "user_id": "me" })).await;
    assert_eq!(next_json(&mut ws).await["error"], "invalid user_id");

    ws.send(tungstenite::Message::Text("nope".into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["error"], "invalid request");
}

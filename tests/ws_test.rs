//! Integration tests for the realtime gateway: forum-scoped fan-out,
//! id validation before upgrade, ping/pong, liveness and teardown.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use forum_server::config::RealtimeConfig;
use forum_server::state::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the server on a random port and return (base_url, addr, state).
async fn start_test_server(realtime: RealtimeConfig) -> (String, SocketAddr, AppState) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = forum_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = AppState::new(db, realtime, CancellationToken::new());

    let app = forum_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, state)
}

/// Create a forum over HTTP and return its id.
async fn create_forum(base_url: &str, title: &str) -> i64 {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/forums", base_url))
        .json(&json!({ "title": title, "description": "test forum" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Forum creation failed for {}", title);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

async fn post_message(base_url: &str, forum_id: i64, author: &str, content: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/forums/{}/messages", base_url, forum_id))
        .json(&json!({ "author": author, "content": content }))
        .send()
        .await
        .unwrap()
}

/// Open a realtime channel and wait until the server has registered it.
async fn subscribe(addr: SocketAddr, state: &AppState, forum_id: i64) -> WsClient {
    let before = state.registry.subscriber_count(forum_id);
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/{}", addr, forum_id))
        .await
        .expect("Failed to connect to WebSocket");
    wait_for_subscribers(state, forum_id, before + 1).await;
    ws
}

/// Poll the registry until `forum_id` has exactly `expected` subscribers.
async fn wait_for_subscribers(state: &AppState, forum_id: i64, expected: usize) {
    for _ in 0..250 {
        if state.registry.subscriber_count(forum_id) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "forum {} has {} subscribers, expected {}",
        forum_id,
        state.registry.subscriber_count(forum_id),
        expected
    );
}

/// Next JSON event within `wait`, skipping control frames.
async fn next_event(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("event is JSON"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_message_fans_out_to_forum_subscribers_only() {
    let (base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;
    let forum = create_forum(&base_url, "three").await;
    let other = create_forum(&base_url, "four").await;

    let mut first = subscribe(addr, &state, forum).await;
    let mut second = subscribe(addr, &state, forum).await;
    let mut bystander = subscribe(addr, &state, other).await;

    let resp = post_message(&base_url, forum, "alice", "hi").await;
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();

    for ws in [&mut first, &mut second] {
        let event = next_event(ws, Duration::from_secs(2))
            .await
            .expect("subscriber should receive the event");
        assert_eq!(event["type"], "message_created");
        assert_eq!(event["payload"]["forum_id"], forum);
        assert_eq!(event["payload"]["content"], "hi");
        assert_eq!(event["payload"]["author"], "alice");
        assert_eq!(event["payload"]["id"], created["id"]);
        assert_eq!(event["payload"]["created_at"], created["created_at"]);

        // Exactly one event per message
        assert!(next_event(ws, Duration::from_millis(200)).await.is_none());
    }

    assert!(
        next_event(&mut bystander, Duration::from_millis(300)).await.is_none(),
        "subscriber of another forum must receive nothing"
    );
}

#[tokio::test]
async fn test_missing_forum_triggers_no_broadcast() {
    let (base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;
    let mut ws = subscribe(addr, &state, 99).await;

    let resp = post_message(&base_url, 99, "alice", "into the void").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Forum not found");

    assert!(next_event(&mut ws, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_forum_created_event() {
    let (base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;

    // Fresh database: the first forum gets id 1
    let mut ws = subscribe(addr, &state, 1).await;
    let id = create_forum(&base_url, "Announcements").await;
    assert_eq!(id, 1);

    let event = next_event(&mut ws, Duration::from_secs(2))
        .await
        .expect("forum_created event");
    assert_eq!(event["type"], "forum_created");
    assert_eq!(event["payload"]["id"], 1);
    assert_eq!(event["payload"]["title"], "Announcements");
}

#[tokio::test]
async fn test_invalid_forum_id_rejected_before_upgrade() {
    let (_base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;

    for raw in ["abc", "0", "-4", "1.5"] {
        let result = tokio_tungstenite::connect_async(format!("ws://{}/ws/{}", addr, raw)).await;
        match result {
            Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
                assert_eq!(resp.status(), 400, "id {:?} should be a client error", raw);
            }
            Err(other) => panic!("Expected HTTP 400 for {:?}, got: {:?}", raw, other),
            Ok(_) => panic!("Upgrade must not succeed for {:?}", raw),
        }
    }

    assert_eq!(state.registry.forum_count(), 0);
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (_base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;
    let mut ws = subscribe(addr, &state, 5).await;

    ws.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(&data[..], &[42u8, 43, 44][..], "Pong data should match ping");
        }
        other => {
            panic!("Expected Pong message, got: {:?}", other);
        }
    }

    // One ping, one pong
    match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
        Err(_) => {}
        Ok(other) => panic!("Expected no further frames, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_connection_cleanup_on_disconnect() {
    let (base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;
    let forum = create_forum(&base_url, "cleanup").await;

    let mut ws = subscribe(addr, &state, forum).await;
    ws.send(Message::Close(None))
        .await
        .expect("Failed to send close");

    wait_for_subscribers(&state, forum, 0).await;
    assert_eq!(state.registry.forum_count(), 0);

    // Broadcasting afterwards reaches nobody and does not fail
    let resp = post_message(&base_url, forum, "bob", "anyone?").await;
    assert_eq!(resp.status(), 201);

    // Reconnect works after cleanup
    let mut again = subscribe(addr, &state, forum).await;
    assert!(next_event(&mut again, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_liveness_timeout() {
    let realtime = RealtimeConfig {
        ping_interval_secs: 1,
        liveness_timeout_secs: 2,
        ..RealtimeConfig::default()
    };
    let (_base_url, addr, state) = start_test_server(realtime).await;

    // Never polled, so the client never answers the server's pings
    let ws = subscribe(addr, &state, 8).await;

    wait_for_subscribers(&state, 8, 0).await;
    drop(ws);
}

#[tokio::test]
async fn test_responsive_client_survives_liveness_window() {
    let realtime = RealtimeConfig {
        ping_interval_secs: 1,
        liveness_timeout_secs: 2,
        ..RealtimeConfig::default()
    };
    let (_base_url, addr, state) = start_test_server(realtime).await;
    let mut ws = subscribe(addr, &state, 6).await;

    // Reading lets tungstenite answer pings automatically
    let reader = tokio::spawn(async move {
        while let Some(Ok(_)) = ws.next().await {}
    });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(state.registry.subscriber_count(6), 1);

    reader.abort();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (_base_url, addr, state) = start_test_server(RealtimeConfig::default()).await;
    let mut ws = subscribe(addr, &state, 2).await;

    state.shutdown();

    let mut saw_close = false;
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => {
                saw_close = true;
                break;
            }
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    assert!(saw_close, "server should send a close frame on shutdown");
    wait_for_subscribers(&state, 2, 0).await;
}

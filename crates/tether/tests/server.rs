//! Integration tests for the Tether server over real WebSocket
//! connections.
//!
//! Frames are dispatched fire-and-forget, so a successful
//! `authenticate` (which sends no acknowledgment) is given a short
//! settling pause before dependent frames are sent.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tether::prelude::*;
use tokio_tungstenite::tungstenite::Message;

const SECRET: &[u8] = b"tether-test-secret";

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn mint(sub: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
        + 3600;
    encode(
        &Header::default(),
        &json!({"sub": sub, "aud": "user", "exp": exp}),
        &EncodingKey::from_secret(SECRET),
    )
    .expect("should sign")
}

fn echo_handler() -> MessageHandler<WebSocketConnection> {
    MessageHandler::new(
        "echo",
        PayloadSchema::new().required("text", FieldKind::String),
        |payload, session| async move {
            session
                .send_message("echoReply", payload, SendOptions::new())
                .await
        },
    )
}

fn test_builder() -> ServerBuilder {
    Server::builder()
        .bind("127.0.0.1:0")
        .session_config(SessionConfig::default())
        .handler(echo_handler())
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = test_builder()
        .build(JwtVerifier::hs256(SECRET))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_json(ws: &mut ClientWs, value: &Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("send");
}

async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("recv");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid JSON");
        }
    }
}

/// Sends an `authenticate` frame and waits for it to take effect.
/// Success is unacknowledged, so there is nothing to await explicitly.
async fn authenticate(ws: &mut ClientWs, token: &str) {
    send_json(ws, &json!({"type": "authenticate", "payload": {"token": token}}))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_ping_answered_before_auth() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_json(&mut ws, &json!({"type": "ping", "payload": null})).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
    assert!(reply["payload"].is_null());
}

#[tokio::test]
async fn test_authenticate_then_echo_round_trip() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    authenticate(&mut ws, &mint("u1")).await;
    send_json(&mut ws, &json!({"type": "echo", "payload": {"text": "hi"}}))
        .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "echoReply");
    assert_eq!(reply["payload"], json!({"text": "hi"}));
}

#[tokio::test]
async fn test_bad_token_reports_auth_failed() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_json(
        &mut ws,
        &json!({"type": "authenticate", "payload": {"token": "not.a.jwt"}}),
    )
    .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["errorCode"], "auth-failed");
}

#[tokio::test]
async fn test_missing_token_reports_no_token() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_json(&mut ws, &json!({"type": "authenticate", "payload": {}})).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["errorCode"], "no-token");
}

#[tokio::test]
async fn test_unauthenticated_message_dropped_without_reply() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_json(&mut ws, &json!({"type": "echo", "payload": {"text": "hi"}}))
        .await;
    send_json(&mut ws, &json!({"type": "ping", "payload": null})).await;

    // The dropped echo produces neither a reply nor an error; the next
    // frame the client sees is the pong.
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn test_malformed_frame_reports_non_json() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::text("this is not json")).await.expect("send");

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["errorCode"], "non-json");
    assert!(reply["payload"]["hint"].is_string());
}

#[tokio::test]
async fn test_validation_failure_reports_field_hints() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    authenticate(&mut ws, &mint("u1")).await;
    send_json(&mut ws, &json!({"type": "echo", "payload": {"text": 5}})).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["errorCode"], "validation-failed");
    assert_eq!(reply["payload"]["hint"]["text"], "expected string, got number");
}

#[tokio::test]
async fn test_second_token_for_other_user_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    authenticate(&mut ws, &mint("u1")).await;
    send_json(
        &mut ws,
        &json!({"type": "authenticate", "payload": {"token": mint("u2")}}),
    )
    .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["errorCode"], "wrong-user-token");

    // The original identity still works.
    send_json(&mut ws, &json!({"type": "echo", "payload": {"text": "ok"}}))
        .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "echoReply");
}

#[tokio::test]
async fn test_multiple_connections_independent() {
    let addr = start_server().await;

    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;

    authenticate(&mut ws1, &mint("alice")).await;
    // ws2 never authenticates; its echoes are dropped while ws1's flow.

    send_json(&mut ws1, &json!({"type": "echo", "payload": {"text": "one"}}))
        .await;
    send_json(&mut ws2, &json!({"type": "echo", "payload": {"text": "two"}}))
        .await;
    send_json(&mut ws2, &json!({"type": "ping", "payload": null})).await;

    let reply1 = recv_json(&mut ws1).await;
    assert_eq!(reply1["payload"], json!({"text": "one"}));

    let reply2 = recv_json(&mut ws2).await;
    assert_eq!(reply2["type"], "pong");
}

#[tokio::test]
async fn test_shutdown_closes_connected_clients() {
    let server = test_builder()
        .session_config(SessionConfig {
            shutdown_grace: Duration::from_secs(1),
            ..SessionConfig::default()
        })
        .build(JwtVerifier::hs256(SECRET))
        .await
        .expect("server should build");
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    let (trigger, stop) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stop.await;
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut ws = connect(&addr).await;
    send_json(&mut ws, &json!({"type": "ping", "payload": null})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    trigger.send(()).expect("server still running");

    // The client sees a close frame (or the stream just ends).
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client was not closed by shutdown");

    running
        .await
        .expect("server task")
        .expect("shutdown is clean");
}

//! Integration tests for WebSocket connection and messaging.

mod helpers;

use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error, Message};

use relayhub_core::config::RealtimeConfig;
use relayhub_realtime::{Message as HubMessage, MessageType};

use helpers::{TestApp, next_frame, recv_json, send_json};

#[tokio::test]
async fn test_ws_upgrade_without_identity() {
    let app = TestApp::new().await;

    match connect_async(app.ws_url()).await {
        Err(Error::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        Err(other) => panic!("Expected an HTTP rejection, got {other}"),
        Ok(_) => panic!("Upgrade without identity should be refused"),
    }

    app.shutdown().await;
}

#[tokio::test]
async fn test_group_chat_between_clients() {
    let app = TestApp::new().await;
    let mut alice = app.connect("alice").await;
    let mut bob = app.connect("bob").await;

    send_json(&mut alice, json!({"type": "join_group", "data": "room"})).await;
    let joined = recv_json(&mut alice).await;
    assert_eq!(joined["type"], "group_joined");
    assert_eq!(joined["data"], "room");

    send_json(
        &mut bob,
        json!({"type": "chat", "data": {"text": "hello"}, "group": "room"}),
    )
    .await;
    let chat = recv_json(&mut alice).await;
    assert_eq!(chat["type"], "chat");
    assert_eq!(chat["from"], "bob");
    assert_eq!(chat["data"]["text"], "hello");

    app.shutdown().await;
}

#[tokio::test]
async fn test_direct_message_reaches_every_user_connection() {
    let app = TestApp::new().await;
    let mut laptop = app.connect("alice").await;
    let mut phone = app.connect("alice").await;
    let mut bob = app.connect("bob").await;

    send_json(
        &mut bob,
        json!({"type": "chat", "data": {"text": "hi alice"}, "to": "alice"}),
    )
    .await;

    for client in [&mut laptop, &mut phone] {
        let chat = recv_json(client).await;
        assert_eq!(chat["from"], "bob");
        assert_eq!(chat["to"], "alice");
        assert_eq!(chat["data"]["text"], "hi alice");
    }

    app.shutdown().await;
}

#[tokio::test]
async fn test_server_broadcast_reaches_everyone() {
    let app = TestApp::new().await;
    let mut alice = app.connect("alice").await;
    let mut bob = app.connect("bob").await;

    app.hub
        .broadcast_to_all(HubMessage::new(
            MessageType::Notification,
            json!({"text": "maintenance at noon"}),
        ))
        .unwrap();

    for client in [&mut alice, &mut bob] {
        let notice = recv_json(client).await;
        assert_eq!(notice["type"], "notification");
        assert_eq!(notice["data"]["text"], "maintenance at noon");
    }

    app.shutdown().await;
}

#[tokio::test]
async fn test_ping_and_unknown_type() {
    let app = TestApp::new().await;
    let mut client = app.connect("carol").await;

    send_json(&mut client, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut client).await["type"], "pong");

    send_json(&mut client, json!({"type": "teleport"})).await;
    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "error");

    app.shutdown().await;
}

#[tokio::test]
async fn test_hub_shutdown_closes_clients() {
    let app = TestApp::new().await;
    let mut client = app.connect("dave").await;

    app.hub.close().await;

    match next_frame(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1001),
        other => panic!("Expected a close frame, got {other:?}"),
    }
    assert_eq!(app.hub.connection_count(), 0);

    app.shutdown().await;
}

#[tokio::test]
async fn test_connection_limit_refuses_with_try_again_later() {
    let app = TestApp::with_realtime(RealtimeConfig {
        max_connections: 1,
        ..RealtimeConfig::default()
    })
    .await;
    let _first = app.connect("erin").await;

    let mut request = app.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-user-id", "frank".parse().unwrap());
    let (mut second, _) = connect_async(request).await.unwrap();

    match next_frame(&mut second).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1013),
        other => panic!("Expected a close frame, got {other:?}"),
    }
    assert_eq!(app.hub.connection_count(), 1);
    assert_eq!(app.hub.user_connection_count("frank"), 0);

    app.shutdown().await;
}

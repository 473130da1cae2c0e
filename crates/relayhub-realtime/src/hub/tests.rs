use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use serde_json::{Value, json};

use relayhub_core::config::RealtimeConfig;
use relayhub_core::error::ErrorKind;

use super::*;
use crate::connection::ConnectionTasks;
use crate::message::MessageType;
use crate::transport::{CLOSE_POLICY, Frame, TransportError};

fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        heartbeat_interval_seconds: 1,
        connection_timeout_seconds: 2,
        shard_count: 4,
        ..RealtimeConfig::default()
    }
}

async fn registered(hub: &Hub, user_id: &str) -> (Arc<Connection>, Mailbox) {
    let (conn, mailbox) = hub.connect(user_id);
    hub.register(conn.clone()).await.unwrap();
    (conn, mailbox)
}

async fn recv_json(mailbox: &mut Mailbox) -> Value {
    let bytes = tokio::time::timeout(Duration::from_secs(2), mailbox.recv())
        .await
        .expect("timed out waiting for mailbox")
        .expect("mailbox closed");
    serde_json::from_slice(&bytes).unwrap()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// In-memory stand-in for a client socket.
struct FakeSocket {
    inbound: UnboundedSender<Result<Frame, TransportError>>,
    outbound: UnboundedReceiver<Frame>,
}

impl FakeSocket {
    fn send_text(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(Frame::Text(Bytes::copy_from_slice(text.as_bytes()))))
            .unwrap();
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.next())
            .await
            .expect("timed out waiting for frame")
    }

    async fn next_message(&mut self) -> Value {
        loop {
            match self.next_frame().await {
                Some(Frame::Text(bytes)) => return serde_json::from_slice(&bytes).unwrap(),
                Some(Frame::Ping(_)) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }
}

async fn served(hub: &Hub, user_id: &str) -> (Arc<Connection>, FakeSocket, ConnectionTasks) {
    let (conn, mailbox) = registered(hub, user_id).await;
    let (inbound, reader) = unbounded();
    let (writer, outbound) = unbounded();
    let tasks = conn.serve(reader, writer, mailbox);
    (conn, FakeSocket { inbound, outbound }, tasks)
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = RealtimeConfig {
        shard_count: 0,
        ..RealtimeConfig::default()
    };
    let err = Hub::new(config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}

#[tokio::test]
async fn test_send_to_user_reaches_every_connection() {
    let hub = Hub::new(test_config()).unwrap();
    let (_a, mut rx_a) = registered(&hub, "u1").await;
    let (_b, mut rx_b) = registered(&hub, "u1").await;

    hub.send_to_user("u1", Message::new(MessageType::Chat, json!("hi")))
        .unwrap();

    for rx in [&mut rx_a, &mut rx_b] {
        let msg = recv_json(rx).await;
        assert_eq!(msg["type"], "chat");
        assert_eq!(msg["data"], "hi");
        assert_eq!(msg["to"], "u1");
    }
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
    assert_eq!(hub.user_connection_count("u1"), 2);

    hub.close().await;
}

#[tokio::test]
async fn test_left_group_receives_nothing() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, mut rx) = registered(&hub, "u1").await;

    conn.join_group("g1").await.unwrap();
    conn.leave_group("g1").await.unwrap();
    hub.broadcast_to_group("g1", Message::new(MessageType::Notification, json!({"n": 1})))
        .unwrap();
    hub.send_to_user("u1", Message::new(MessageType::Success, json!("sentinel")))
        .unwrap();

    let first = recv_json(&mut rx).await;
    assert_eq!(first["data"], "sentinel");
    assert_eq!(hub.group_connection_count("g1"), 0);

    hub.close().await;
}

#[tokio::test]
async fn test_group_broadcast_reaches_members_only() {
    let hub = Hub::new(test_config()).unwrap();
    let (member, mut member_rx) = registered(&hub, "u1").await;
    let (_other, mut other_rx) = registered(&hub, "u2").await;

    member.join_group("g1").await.unwrap();
    hub.broadcast_to_group("g1", Message::new(MessageType::Notification, json!({"n": 1})))
        .unwrap();
    hub.send_to_user("u2", Message::new(MessageType::Success, json!("sentinel")))
        .unwrap();

    let msg = recv_json(&mut member_rx).await;
    assert_eq!(msg["group"], "g1");
    assert_eq!(recv_json(&mut other_rx).await["data"], "sentinel");
    assert_eq!(hub.group_connection_count("g1"), 1);

    hub.close().await;
}

#[tokio::test]
async fn test_groups_joined_before_registration_are_indexed() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, _rx) = hub.connect("u1");

    conn.join_group("early").await.unwrap();
    hub.register(conn.clone()).await.unwrap();

    assert_eq!(hub.group_connection_count("early"), 1);
    hub.close().await;
}

#[tokio::test]
async fn test_broadcast_to_all_covers_every_shard() {
    let hub = Hub::new(test_config()).unwrap();
    let mut mailboxes = Vec::new();
    for i in 0..12 {
        let (_conn, rx) = registered(&hub, &format!("u{i}")).await;
        mailboxes.push(rx);
    }

    hub.broadcast_to_all(Message::new(MessageType::Notification, json!({"all": true})))
        .unwrap();

    for rx in &mut mailboxes {
        let msg = recv_json(rx).await;
        assert_eq!(msg["data"]["all"], true);
        assert!(msg.get("to").is_none());
    }

    let stats = hub.stats().await;
    assert_eq!(stats.connections, 12);
    assert_eq!(stats.shard_count, 4);
    assert_eq!(stats.shard_sizes.iter().sum::<usize>(), 12);

    hub.close().await;
}

#[tokio::test]
async fn test_connection_limit_refuses_registration() {
    let config = RealtimeConfig {
        max_connections: 1,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (_first, _rx) = registered(&hub, "u1").await;

    let (second, _rx2) = hub.connect("u2");
    let err = hub.register(second.clone()).await.unwrap_err();

    assert_eq!(err, HubError::ConnectionLimitExceeded { limit: 1 });
    assert!(second.is_closed());
    assert_eq!(hub.connection_count(), 1);
    assert!(hub.get_connection(&second.id()).is_none());
    assert_eq!(hub.stats().await.counters.connections_rejected, 1);

    hub.close().await;
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, mut rx) = registered(&hub, "u1").await;
    conn.join_group("g1").await.unwrap();

    assert!(hub.unregister(conn.id()).await.unwrap());
    assert!(!hub.unregister(conn.id()).await.unwrap());

    assert_eq!(hub.connection_count(), 0);
    assert_eq!(hub.user_connection_count("u1"), 0);
    assert_eq!(hub.group_connection_count("g1"), 0);
    assert_eq!(conn.status().await, ConnectionStatus::Disconnected);
    assert!(rx.recv().await.is_none());

    hub.close().await;
}

#[tokio::test]
async fn test_disconnect() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, _rx) = registered(&hub, "u1").await;

    let missing = ConnectionId::new();
    assert_eq!(
        hub.disconnect(missing).await,
        Err(HubError::ConnectionNotFound(missing))
    );

    hub.disconnect(conn.id()).await.unwrap();
    assert!(conn.is_closed());
    assert!(!hub.is_connection_alive(&conn.id()));
    assert_eq!(hub.connection_count(), 0);

    hub.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sweep_removes_stale_connection() {
    let hub = Hub::new(test_config()).unwrap();
    let (stale, mut stale_rx) = registered(&hub, "u1").await;
    let (_fresh, _fresh_rx) = registered(&hub, "u2").await;

    stale.backdate_last_ping(chrono::Duration::hours(1)).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    eventually(|| hub.connection_count() == 1).await;

    assert!(stale.is_closed());
    assert_eq!(
        stale.close_frame.get().map(|f| f.code),
        Some(crate::transport::CLOSE_GOING_AWAY)
    );
    assert!(stale_rx.recv().await.is_none());
    assert_eq!(hub.stats().await.counters.heartbeat_timeouts, 1);

    hub.close().await;
}

#[tokio::test]
async fn test_close_on_backpressure_closes_slow_consumer() {
    let config = RealtimeConfig {
        mailbox_size: 1,
        close_on_backpressure: true,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (conn, _rx) = registered(&hub, "slow").await;

    for i in 0..3 {
        hub.send_to_user("slow", Message::new(MessageType::Chat, json!({"i": i})))
            .unwrap();
    }

    eventually(|| conn.is_closed()).await;
    assert_eq!(conn.close_frame.get().map(|f| f.code), Some(CLOSE_POLICY));
    assert!(hub.stats().await.counters.messages_dropped >= 1);

    hub.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, mut rx) = registered(&hub, "u1").await;

    hub.close().await;
    hub.close().await;

    assert!(hub.is_closed());
    assert_eq!(hub.connection_count(), 0);
    assert!(conn.is_closed());
    assert!(rx.recv().await.is_none());
    assert_eq!(
        hub.send_to_user("u1", Message::new(MessageType::Chat, json!({}))),
        Err(HubError::HubClosed)
    );

    let (late, _late_rx) = hub.connect("u2");
    assert_eq!(hub.register(late.clone()).await, Err(HubError::HubClosed));
    assert!(late.is_closed());
}

#[tokio::test]
async fn test_served_connection_round_trip() {
    let hub = Hub::new(test_config()).unwrap();
    let (_alice, mut alice, _alice_tasks) = served(&hub, "alice").await;
    let (_bob, mut bob, _bob_tasks) = served(&hub, "bob").await;

    alice.send_text(r#"{"type":"join_group","data":"room"}"#);
    let joined = alice.next_message().await;
    assert_eq!(joined["type"], "group_joined");
    assert_eq!(joined["data"], "room");

    bob.send_text(r#"{"type":"chat","data":{"text":"hello"},"group":"room"}"#);
    let chat = alice.next_message().await;
    assert_eq!(chat["type"], "chat");
    assert_eq!(chat["from"], "bob");
    assert_eq!(chat["data"]["text"], "hello");
    assert!(chat["timestamp"].as_i64().unwrap() > 0);

    bob.send_text(r#"{"type":"ping"}"#);
    assert_eq!(bob.next_message().await["type"], "pong");

    bob.send_text(r#"{"type":"status","data":{"mood":"busy"}}"#);
    bob.send_text(r#"{"type":"status","data":{"away":true}}"#);
    assert_eq!(bob.next_message().await["data"], json!({"mood": "busy"}));
    assert_eq!(
        bob.next_message().await["data"],
        json!({"mood": "busy", "away": true})
    );

    assert_eq!(hub.stats().await.counters.messages_received, 5);
    hub.close().await;
}

#[tokio::test]
async fn test_bad_requests_produce_error_frames() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, mut client, _tasks) = served(&hub, "u1").await;

    client.send_text("not json");
    assert_eq!(client.next_message().await["type"], "error");

    client.send_text(r#"{"type":"teleport"}"#);
    let err = client.next_message().await;
    assert_eq!(err["data"], "invalid message type: teleport");

    client.send_text(r#"{"type":"success","data":"forged"}"#);
    let err = client.next_message().await;
    assert!(err["data"].as_str().unwrap().contains("not accepted from clients"));

    client.send_text(r#"{"type":"chat","data":{"text":"nowhere"}}"#);
    let err = client.next_message().await;
    assert!(err["data"].as_str().unwrap().contains("recipient"));

    client.send_text(r#"{"type":"join_group","data":"   "}"#);
    assert_eq!(client.next_message().await["type"], "error");

    assert!(conn.is_alive());
    assert_eq!(hub.connection_count(), 1);
    hub.close().await;
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let config = RealtimeConfig {
        max_message_size: 32,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (_conn, mut client, _tasks) = served(&hub, "u1").await;

    client.send_text(&format!(r#"{{"type":"status","data":{{"k":"{}"}}}}"#, "x".repeat(64)));
    let err = client.next_message().await;
    assert!(err["data"].as_str().unwrap().contains("maximum size"));

    hub.close().await;
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, mut client, tasks) = served(&hub, "u1").await;

    client
        .inbound
        .unbounded_send(Ok(Frame::Close(Some(CloseFrame::new(CLOSE_NORMAL, "bye")))))
        .unwrap();
    tasks.join().await;

    assert_eq!(hub.connection_count(), 0);
    assert!(conn.is_closed());
    assert_eq!(conn.status().await, ConnectionStatus::Disconnected);
    loop {
        match client.next_frame().await {
            Some(Frame::Ping(_)) => continue,
            Some(Frame::Close(Some(close))) => {
                assert_eq!(close.code, CLOSE_NORMAL);
                break;
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    hub.close().await;
}

#[tokio::test]
async fn test_transport_error_marks_connection_errored() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, client, tasks) = served(&hub, "u1").await;

    client
        .inbound
        .unbounded_send(Err(TransportError::new("connection reset")))
        .unwrap();
    tasks.join().await;

    assert_eq!(conn.status().await, ConnectionStatus::Error);
    assert_eq!(hub.connection_count(), 0);

    hub.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_times_out() {
    let hub = Hub::new(test_config()).unwrap();
    let (conn, _client, tasks) = served(&hub, "u1").await;

    tasks.join().await;

    assert!(conn.is_closed());
    assert_eq!(hub.connection_count(), 0);
    hub.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_writer_pings_on_its_own_ticker() {
    let hub = Hub::new(test_config()).unwrap();
    let (_conn, mut client, _tasks) = served(&hub, "u1").await;

    assert!(matches!(client.next_frame().await, Some(Frame::Ping(_))));
    hub.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_global_ping_workers_drive_pings() {
    let config = RealtimeConfig {
        enable_global_ping: true,
        ping_worker_count: 1,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (_conn, mut client, _tasks) = served(&hub, "u1").await;

    assert!(matches!(client.next_frame().await, Some(Frame::Ping(_))));
    hub.close().await;
}

#[tokio::test]
async fn test_application_frames_refresh_last_ping() {
    let hub = Hub::new(RealtimeConfig::default()).unwrap();
    let (conn, mut client, _tasks) = served(&hub, "u1").await;
    conn.backdate_last_ping(chrono::Duration::hours(1)).await;

    client.send_text(r#"{"type":"status","data":{"k":1}}"#);
    assert_eq!(client.next_message().await["type"], "status_updated");

    let age = chrono::Utc::now() - conn.last_ping().await;
    assert!(age < chrono::Duration::seconds(5), "last_ping is {age} old");
    hub.close().await;
}

#[tokio::test]
async fn test_full_broadcast_queue_sheds_jobs() {
    let config = RealtimeConfig {
        broadcast_queue_size: 1,
        broadcast_worker_count: 1,
        shard_count: 4,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (_conn, mut rx) = registered(&hub, "u1").await;

    hub.broadcast_to_all(Message::new(MessageType::Notification, json!({"all": true})))
        .unwrap();
    hub.send_to_user("u1", Message::new(MessageType::Chat, json!("after")))
        .unwrap();

    // The broadcast reaches u1 only if its shard's job was the one kept.
    loop {
        let msg = recv_json(&mut rx).await;
        if msg["type"] == "chat" {
            assert_eq!(msg["data"], "after");
            break;
        }
    }
    assert_eq!(hub.stats().await.counters.broadcast_jobs_dropped, 3);

    hub.close().await;
}

#[tokio::test]
async fn test_bounded_wait_delivers_past_slow_member() {
    let config = RealtimeConfig {
        mailbox_size: 1,
        drop_on_full: false,
        send_timeout_ms: 50,
        ..test_config()
    };
    let hub = Hub::new(config).unwrap();
    let (slow, _slow_rx) = registered(&hub, "slow").await;
    let (fast, mut fast_rx) = registered(&hub, "fast").await;
    slow.join_group("g1").await.unwrap();
    fast.join_group("g1").await.unwrap();

    hub.send_to_user("slow", Message::new(MessageType::Chat, json!("fill")))
        .unwrap();
    hub.broadcast_to_group("g1", Message::new(MessageType::Notification, json!({"n": 1})))
        .unwrap();

    assert_eq!(recv_json(&mut fast_rx).await["group"], "g1");

    let mut dropped = 0;
    for _ in 0..100 {
        dropped = hub.stats().await.counters.messages_dropped;
        if dropped > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dropped, 1);
    assert!(!slow.is_closed());

    hub.close().await;
}

#[tokio::test]
async fn test_close_finishes_after_interrupted_close() {
    use futures::FutureExt;

    let hub = Hub::new(test_config()).unwrap();
    let (conn, _rx) = registered(&hub, "u1").await;

    // Dropped while waiting on the dispatcher.
    assert!(hub.close().now_or_never().is_none());
    assert_eq!(hub.connection_count(), 1);

    hub.close().await;
    assert_eq!(hub.connection_count(), 0);
    assert!(conn.is_closed());
}

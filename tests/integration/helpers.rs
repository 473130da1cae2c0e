//! Shared test helpers for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use relayhub_api::{AppState, build_app};
use relayhub_core::config::{AppConfig, RealtimeConfig};
use relayhub_realtime::Hub;

/// Client side of a test WebSocket.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for any single event.
const WAIT: Duration = Duration::from_secs(5);

/// A server bound to an ephemeral local port.
pub struct TestApp {
    /// Bound address
    pub addr: SocketAddr,
    /// The hub behind the server
    pub hub: Hub,
    server: JoinHandle<()>,
}

impl TestApp {
    /// Start a server with default settings
    pub async fn new() -> Self {
        Self::with_realtime(RealtimeConfig::default()).await
    }

    /// Start a server with the given hub settings
    pub async fn with_realtime(realtime: RealtimeConfig) -> Self {
        let config = AppConfig {
            realtime,
            ..AppConfig::default()
        };
        let hub = Hub::new(config.realtime.clone()).expect("Failed to start hub");
        let app = build_app(AppState::new(config, hub.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server failed");
        });

        Self { addr, hub, server }
    }

    /// WebSocket URL of the server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Open a socket as `user_id` and wait until the hub has registered it
    pub async fn connect(&self, user_id: &str) -> Client {
        let before = self.hub.user_connection_count(user_id);

        let mut request = self.ws_url().into_client_request().expect("Bad URL");
        request
            .headers_mut()
            .insert("x-user-id", user_id.parse().expect("Bad header value"));
        let (socket, _) = connect_async(request).await.expect("Failed to connect");

        let hub = self.hub.clone();
        let user = user_id.to_string();
        eventually(move || hub.user_connection_count(&user) > before).await;
        socket
    }

    /// Close the hub and stop the server
    pub async fn shutdown(self) {
        self.hub.close().await;
        self.server.abort();
    }
}

/// Poll `check` until it holds or the wait expires
pub async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Send a JSON text frame
pub async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send");
}

/// Next frame that is not a protocol ping or pong
pub async fn next_frame(client: &mut Client) -> Message {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket ended")
            .expect("Socket error");
        match frame {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

/// Next text frame, parsed as JSON
pub async fn recv_json(client: &mut Client) -> Value {
    match next_frame(client).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("Invalid JSON"),
        other => panic!("Expected a text frame, got {other:?}"),
    }
}

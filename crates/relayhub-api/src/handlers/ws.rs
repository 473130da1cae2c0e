//! WebSocket upgrade handler.
//!
//! Adapts Axum's socket halves to the hub's transport-neutral [`Frame`]
//! stream and sink, registers the connection, and serves it until either
//! side closes.

use axum::extract::ws::{self, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use bytes::Bytes;
use futures::{SinkExt, StreamExt, future};
use tracing::{info, warn};

use relayhub_realtime::transport::CLOSE_TRY_AGAIN_LATER;
use relayhub_realtime::{CloseFrame, Frame};

use crate::extractors::UserIdentity;
use crate::state::AppState;

/// GET /ws: WebSocket upgrade for an identified user.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    UserIdentity(user_id): UserIdentity,
    ws: WebSocketUpgrade,
) -> Response {
    // Oversized frames are rejected by the hub with an error reply; the
    // transport only guards against frames far beyond that.
    let cap = state.hub.config().max_message_size.saturating_mul(2);

    ws.max_message_size(cap)
        .max_frame_size(cap)
        .on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: String, socket: WebSocket) {
    let (mut sink, stream) = socket.split();
    let (conn, mailbox) = state.hub.connect(user_id.clone());
    let conn_id = conn.id();

    if let Err(e) = state.hub.register(conn.clone()).await {
        warn!(conn_id = %conn_id, user_id = %user_id, error = %e, "WebSocket connection refused");
        let _ = sink
            .send(Message::Close(Some(ws::CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: e.to_string().into(),
            })))
            .await;
        return;
    }

    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection established");

    let reader = stream.map(|item| item.map(from_ws));
    let writer = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(into_ws(frame))));

    conn.serve(reader, writer, mailbox).join().await;

    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection closed");
}

fn from_ws(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(Bytes::copy_from_slice(text.as_str().as_bytes())),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(frame) => {
            Frame::Close(frame.map(|f| CloseFrame::new(f.code, f.reason.as_str())))
        }
    }
}

fn into_ws(frame: Frame) -> Message {
    match frame {
        Frame::Text(data) => Message::Text(String::from_utf8_lossy(&data).into_owned().into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(frame) => Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code,
            reason: f.reason.into(),
        })),
    }
}

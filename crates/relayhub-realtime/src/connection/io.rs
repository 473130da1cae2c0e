//! Reader and writer loops driving a connection over a duplex socket.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::transport::{CLOSE_GOING_AWAY, CLOSE_NORMAL, CloseFrame, Frame};

use super::handle::{Connection, Mailbox};
use super::status::ConnectionStatus;

/// Upper bound on a single socket write.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Why the reader stopped.
#[derive(Debug)]
enum ReadEnd {
    /// Peer sent a normal or going-away close.
    Graceful(CloseFrame),
    /// Peer closed with another code, or the stream ended.
    ClientClosed(Option<CloseFrame>),
    /// Transport failure.
    Unexpected(String),
    /// Nothing arrived within the connection timeout.
    Timeout,
    /// Teardown was started elsewhere.
    ForceClosed,
}

/// Join handles of a served connection's two loops.
#[derive(Debug)]
pub struct ConnectionTasks {
    /// Inbound loop; unregisters the connection when it ends.
    pub reader: JoinHandle<()>,
    /// Outbound loop; sends the close frame when it ends.
    pub writer: JoinHandle<()>,
}

impl ConnectionTasks {
    /// Waits for both loops to finish.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

impl Connection {
    /// Spawns the reader and writer loops over a socket's two halves.
    ///
    /// The connection should already be registered. Whichever loop stops
    /// first cancels the other; the reader always unregisters on exit.
    pub fn serve<R, RE, W, WE>(self: &Arc<Self>, reader: R, writer: W, mailbox: Mailbox) -> ConnectionTasks
    where
        R: Stream<Item = Result<Frame, RE>> + Send + 'static,
        RE: Display + Send + 'static,
        W: Sink<Frame, Error = WE> + Send + 'static,
        WE: Display + Send + 'static,
    {
        ConnectionTasks {
            reader: tokio::spawn(Arc::clone(self).read_loop(reader)),
            writer: tokio::spawn(Arc::clone(self).write_loop(writer, mailbox)),
        }
    }

    async fn read_loop<R, E>(self: Arc<Self>, reader: R)
    where
        R: Stream<Item = Result<Frame, E>> + Send,
        E: Display + Send,
    {
        let mut reader = Box::pin(reader);
        let deadline = self.hub.config.connection_timeout();

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = self.closer.cancelled() => break ReadEnd::ForceClosed,
                next = tokio::time::timeout(deadline, reader.next()) => next,
            };

            let frame = match next {
                Err(_) => break ReadEnd::Timeout,
                Ok(None) => break ReadEnd::ClientClosed(None),
                Ok(Some(Err(e))) => break ReadEnd::Unexpected(e.to_string()),
                Ok(Some(Ok(frame))) => frame,
            };

            // Any inbound frame proves the peer is alive.
            self.touch().await;

            match frame {
                Frame::Text(raw) | Frame::Binary(raw) => self.handle_inbound(&raw).await,
                Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Close(Some(close)) if close.is_graceful() => break ReadEnd::Graceful(close),
                Frame::Close(close) => break ReadEnd::ClientClosed(close),
            }
        };

        self.finish_read(end).await;
    }

    async fn finish_read(&self, end: ReadEnd) {
        let conn_id = self.id();
        match &end {
            ReadEnd::Graceful(close) => {
                debug!(conn_id = %conn_id, code = close.code, "Client closed connection");
                let _ = self.close_frame.set(CloseFrame::new(CLOSE_NORMAL, ""));
            }
            ReadEnd::ClientClosed(close) => {
                debug!(
                    conn_id = %conn_id,
                    code = close.as_ref().map(|c| c.code),
                    "Connection closed by peer"
                );
            }
            ReadEnd::Unexpected(error) => {
                warn!(conn_id = %conn_id, error = %error, "Connection read failed");
                self.set_status(ConnectionStatus::Error).await;
            }
            ReadEnd::Timeout => {
                info!(conn_id = %conn_id, "Connection read timed out");
                let _ = self
                    .close_frame
                    .set(CloseFrame::new(CLOSE_GOING_AWAY, "read timeout"));
            }
            ReadEnd::ForceClosed => {
                debug!(conn_id = %conn_id, "Connection reader stopped by close");
            }
        }

        self.mark_dead();
        if let Err(e) = self.hub.unregister(conn_id).await {
            debug!(conn_id = %conn_id, error = %e, "Unregister skipped");
        }
        self.closer.cancel();
    }

    async fn write_loop<W, E>(self: Arc<Self>, writer: W, mut mailbox: Mailbox)
    where
        W: Sink<Frame, Error = E> + Send,
        E: Display + Send,
    {
        let mut writer = Box::pin(writer);
        let global_ping = self.hub.config.enable_global_ping;
        let period = self.hub.config.local_ping_period();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result: Result<(), String> = loop {
            let frame = tokio::select! {
                biased;
                _ = self.closer.cancelled() => break Ok(()),
                next = mailbox.recv() => match next {
                    Some(payload) => Frame::Text(payload),
                    None => break Ok(()),
                },
                _ = self.ping_signal.notified(), if global_ping => Frame::Ping(Default::default()),
                _ = ticker.tick(), if !global_ping => Frame::Ping(Default::default()),
            };

            match tokio::time::timeout(WRITE_WAIT, writer.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => break Err(e.to_string()),
                Err(_) => break Err("write timed out".to_string()),
            }
        };

        match result {
            Ok(()) => {
                let close = self
                    .close_frame
                    .get()
                    .cloned()
                    .unwrap_or_else(|| CloseFrame::new(CLOSE_NORMAL, ""));
                let _ = tokio::time::timeout(WRITE_WAIT, writer.send(Frame::Close(Some(close)))).await;
            }
            Err(error) => {
                warn!(conn_id = %self.id(), error = %error, "Connection write failed");
                self.set_status(ConnectionStatus::Error).await;
            }
        }
        let _ = tokio::time::timeout(WRITE_WAIT, writer.close()).await;

        self.mark_dead();
        self.closer.cancel();
        debug!(conn_id = %self.id(), "Connection writer stopped");
    }
}

//! Per-connection state machine.
//!
//! `Connecting -> Open -> Closing -> Closed`. The handler owns the receive
//! half of the socket; a writer task spawned by the handler owns the send half
//! and drains the connection's outbound queue, so every frame written to one
//! peer goes through a single writer.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::Utf8Bytes;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Broadcaster, Registry};
use crate::client::{Connection, ConnectionState, Outbound};
use crate::config::RelaySettings;
use crate::utils::{CloseReason, HandshakeError};

pub struct ConnectionHandler {
    conn: Arc<Connection>,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    settings: RelaySettings,
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    pub fn new(
        conn: Arc<Connection>,
        broadcaster: Arc<Broadcaster>,
        settings: RelaySettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conn,
            registry: broadcaster.registry().clone(),
            broadcaster,
            settings,
            shutdown,
        }
    }

    /// Drive the connection until it is closed and return why it closed.
    pub async fn run<S>(self, ws: WebSocketStream<S>, outbound: Outbound) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut stream) = ws.split();
        let writer = tokio::spawn(write_loop(self.conn.clone(), sink, outbound));

        let reason = match self.open().await {
            Ok(()) => self.receive_loop(&mut stream).await,
            Err(reason) => reason,
        };

        self.close(reason, writer).await;
        reason
    }

    async fn open(&self) -> Result<(), CloseReason> {
        let topic = self.conn.topic.as_str();
        if topic.trim().is_empty() {
            warn!(conn_id = %self.conn.id, error = %HandshakeError::MissingTopic, "rejecting connection");
            return Err(CloseReason::PolicyViolation);
        }

        if let Err(e) = self.registry.join(topic, self.conn.clone()) {
            error!(conn_id = %self.conn.id, topic, error = %e, "join failed");
            return Err(CloseReason::InternalError);
        }
        self.conn.advance(ConnectionState::Open);
        info!(conn_id = %self.conn.id, topic, "connection established");

        if self.settings.send_welcome {
            let welcome = format!("WebSocket connection established for topic: {topic}. Welcome!");
            if let Err(e) = self
                .conn
                .send(WsMessage::text(welcome), self.settings.send_timeout())
                .await
            {
                warn!(conn_id = %self.conn.id, error = %e, "failed to queue welcome");
                return Err(CloseReason::TransportError);
            }
        }
        Ok(())
    }

    async fn receive_loop<St>(&self, stream: &mut St) -> CloseReason
    where
        St: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let topic = self.conn.topic.as_str();
        let exclude = (!self.settings.echo_to_sender).then_some(&self.conn.id);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return CloseReason::GoingAway,
                _ = self.conn.terminated() => return CloseReason::TransportError,
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(conn_id = %self.conn.id, topic, len = text.len(), "received message");
                        self.broadcaster.publish(topic, text, exclude).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(conn_id = %self.conn.id, ?frame, "peer closed");
                        return CloseReason::NormalClosure;
                    }
                    // Only text is relayed; pings are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %self.conn.id, topic, error = %e, "transport error");
                        return CloseReason::TransportError;
                    }
                    None => return CloseReason::TransportError,
                }
            }
        }
    }

    async fn close(&self, reason: CloseReason, mut writer: JoinHandle<()>) {
        self.conn.advance(ConnectionState::Closing);
        self.registry.leave(&self.conn.topic, &self.conn.id);

        let timeout = self.settings.close_timeout();
        let frame_queued = match reason.close_code() {
            Some(code) => {
                let frame = CloseFrame {
                    code,
                    reason: Utf8Bytes::from_static(reason.description()),
                };
                self.conn
                    .send_close(WsMessage::Close(Some(frame)), timeout)
                    .await
                    .is_ok()
            }
            None => false,
        };

        if !frame_queued || tokio::time::timeout(timeout, &mut writer).await.is_err() {
            writer.abort();
        }

        self.conn.advance(ConnectionState::Closed);
        let duration_ms = (chrono::Utc::now() - self.conn.connected_at).num_milliseconds();
        info!(
            conn_id = %self.conn.id,
            topic = %self.conn.topic,
            reason = %reason,
            duration_ms,
            "connection closed"
        );
    }
}

/// Drains `outbound` into the socket. Stops after writing a close frame, or
/// terminates the connection if the peer cannot be written to.
async fn write_loop<S>(
    conn: Arc<Connection>,
    mut sink: SplitSink<WebSocketStream<S>, WsMessage>,
    mut outbound: Outbound,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = outbound.recv().await {
        let closing = msg.is_close();
        if let Err(e) = sink.send(msg).await {
            if !closing {
                warn!(conn_id = %conn.id, error = %e, "failed to write to peer");
                conn.terminate();
                return;
            }
            // The peer closed first; tungstenite already queued the reply.
            debug!(conn_id = %conn.id, error = %e, "close frame not written");
        }
        if closing {
            break;
        }
    }

    if let Err(e) = sink.close().await {
        debug!(conn_id = %conn.id, error = %e, "sink close failed");
    }
}

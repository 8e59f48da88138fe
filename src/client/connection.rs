use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::DeliveryError;

pub type ConnectionId = String;

/// Lifecycle of a connection. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Messages are only queued before the connection starts closing.
    pub fn accepts_sends(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

/// Receiving side of a connection's outbound queue. Drained by exactly one
/// writer, which owns the transport sink.
#[derive(Debug)]
pub struct Outbound {
    pub(crate) receiver: mpsc::Receiver<WsMessage>,
}

impl Outbound {
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WsMessage> {
        self.receiver.try_recv().ok()
    }
}

/// A connected peer bound to a single topic.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub topic: String,
    pub connected_at: DateTime<Utc>,
    state: AtomicU8,
    sender: mpsc::Sender<WsMessage>,
    terminate: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Connecting` state with an outbound queue of
    /// `capacity` messages.
    pub fn new(topic: impl Into<String>, capacity: usize) -> (Self, Outbound) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: format!("conn-{}", Uuid::new_v4()),
            topic: topic.into(),
            connected_at: Utc::now(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            sender,
            terminate: CancellationToken::new(),
        };
        (conn, Outbound { receiver })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if it lies strictly ahead of the current state.
    ///
    /// Returns `false` when the transition would stay put or go backwards,
    /// so a closed connection can never be reopened.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                ((next as u8) > current).then_some(next as u8)
            })
            .is_ok()
    }

    /// Queue `message` for this connection, waiting at most `timeout` for
    /// room in the queue.
    pub async fn send(&self, message: WsMessage, timeout: Duration) -> Result<(), DeliveryError> {
        if !self.state().accepts_sends() {
            return Err(DeliveryError::Closed(self.id.clone()));
        }
        self.enqueue(message, timeout).await
    }

    /// Queue a close frame. Bypasses the state check so the handler can still
    /// write it while `Closing`.
    pub(crate) async fn send_close(
        &self,
        message: WsMessage,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        if self.state() == ConnectionState::Closed {
            return Err(DeliveryError::Closed(self.id.clone()));
        }
        self.enqueue(message, timeout).await
    }

    async fn enqueue(&self, message: WsMessage, timeout: Duration) -> Result<(), DeliveryError> {
        match tokio::time::timeout(timeout, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed(self.id.clone())),
            Err(_) => Err(DeliveryError::Timeout(self.id.clone(), timeout)),
        }
    }

    /// Ask the owning handler to tear this connection down.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.is_cancelled()
    }

    /// Resolves once `terminate` has been called.
    pub async fn terminated(&self) {
        self.terminate.cancelled().await
    }
}

//! Error types for the relay.
//!
//! Per-connection failures (`HandshakeError`, transport errors, `DeliveryError`)
//! stay inside the connection that produced them. Only `RelayError::ListenerFatal`
//! and configuration errors reach the process boundary.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::client::ConnectionId;

/// Why a handshake was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("no topic specified")]
    MissingTopic,
    #[error("request is not a websocket upgrade")]
    NotUpgrade,
    #[error("handshake not completed within {0:?}")]
    TimedOut(Duration),
}

/// A single recipient could not be handed a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("send to {0} timed out after {1:?}")]
    Timeout(ConnectionId, Duration),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("listener failed: {0}")]
    ListenerFatal(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Reason a connection left the `Open` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Missing or empty topic.
    PolicyViolation,
    /// Peer sent a close frame.
    NormalClosure,
    /// Read/write failure, reset, or a failed delivery to this connection.
    TransportError,
    /// The server is shutting down.
    GoingAway,
    /// Registry rejected the join.
    InternalError,
}

impl CloseReason {
    /// Close code to put in our close frame. `None` means no frame is sent
    /// because the transport is already unusable.
    pub fn close_code(self) -> Option<CloseCode> {
        match self {
            CloseReason::PolicyViolation => Some(CloseCode::Policy),
            CloseReason::NormalClosure => Some(CloseCode::Normal),
            CloseReason::TransportError => None,
            CloseReason::GoingAway => Some(CloseCode::Away),
            CloseReason::InternalError => Some(CloseCode::Error),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CloseReason::PolicyViolation => "No topic specified.",
            CloseReason::NormalClosure => "",
            CloseReason::TransportError => "transport error",
            CloseReason::GoingAway => "Server shutting down.",
            CloseReason::InternalError => "Internal error.",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CloseReason::PolicyViolation => "policy_violation",
            CloseReason::NormalClosure => "normal_closure",
            CloseReason::TransportError => "transport_error",
            CloseReason::GoingAway => "going_away",
            CloseReason::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

//! Shared utilities: the error taxonomy and logging setup used across the
//! relay.

pub mod error;
pub mod logging;

pub use error::{CloseReason, DeliveryError, HandshakeError, RelayError};

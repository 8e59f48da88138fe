//! The `client` module models one connected peer.
//!
//! A `Connection` is the handle the registry and broadcaster share: its id,
//! its topic, its lifecycle state and the sending side of its outbound queue.
//! The receiving side (`Outbound`) is owned by the connection's handler.

pub mod connection;
pub use connection::{Connection, ConnectionId, ConnectionState, Outbound};

#[cfg(test)]
mod tests;

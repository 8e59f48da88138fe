//! # Topic Relay
//!
//! `topic_relay` is a topic-scoped publish/subscribe relay over WebSockets.
//! A client connects with `?topic=<name>`; every text message it sends is
//! fanned out to the other current members of that topic.
//!
//! ## Core Modules
//!
//! - `broker`: topic membership (`Registry`) and fan-out (`Broadcaster`).
//! - `client`: one connected peer (`Connection`) and its lifecycle state.
//! - `config`: loading and merging settings from file and environment.
//! - `transport`: handshake, per-connection handler and the accept loop.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

pub use broker::{Broadcaster, DeliveryReport, Registry};
pub use client::{Connection, ConnectionState};
pub use config::{Settings, load_config};
pub use transport::RelayServer;
pub use utils::{CloseReason, RelayError};

//! The `transport` module connects sockets to the broker.
//!
//! It performs the websocket handshake (extracting the topic), runs one
//! `ConnectionHandler` per connection, and owns the accept loop with its
//! graceful shutdown.

pub mod handler;
pub mod handshake;
pub mod server;

pub use handler::ConnectionHandler;
pub use server::RelayServer;

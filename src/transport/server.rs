//! Accept loop and connection bootstrap.
//!
//! Every accepted socket runs in its own task tracked by a `TaskTracker`.
//! Cancelling the server's token stops the accept loop, makes every handler
//! run its close path, and `run` returns once all of them have finished.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Role;

use crate::broker::{Broadcaster, Registry};
use crate::client::Connection;
use crate::config::Settings;
use crate::transport::handler::ConnectionHandler;
use crate::transport::handshake::{self, BAD_REQUEST_RESPONSE};
use crate::utils::{HandshakeError, RelayError};

pub struct RelayServer {
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    settings: Settings,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    /// Upgraded connections currently held by a handler.
    live: Arc<AtomicUsize>,
}

impl RelayServer {
    /// Bind the listener described by `settings.server`.
    pub async fn bind(settings: Settings) -> Result<Self, RelayError> {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(RelayError::ListenerFatal)?;

        let registry = Arc::new(Registry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry, settings.relay.send_timeout()));

        Ok(Self {
            listener,
            broadcaster,
            settings,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.broadcaster.registry().clone()
    }

    /// Number of upgraded connections, not counting sockets still handshaking.
    pub fn active_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shut down or the listener fails, then close
    /// every live connection and wait for their handlers to finish.
    pub async fn run(self) -> Result<(), RelayError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("relay listening on ws://{addr}");
        }

        let result = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "accept failed; continuing");
                    }
                    Err(e) => {
                        error!(error = %e, "listener failed");
                        break Err(RelayError::ListenerFatal(e));
                    }
                }
            }
        };

        self.shutdown.cancel();
        self.tracker.close();
        info!(active = self.tracker.len(), "waiting for connections to close");
        self.tracker.wait().await;
        info!("relay stopped");

        result
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let broadcaster = self.broadcaster.clone();
        let settings = self.settings.clone();
        let live = self.live.clone();
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            if let Err(e) = serve_socket(stream, broadcaster, settings, live, shutdown).await {
                debug!(%peer, error = %e, "connection ended before it was established");
            }
        });
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// A reserved place under `server.max_connections`, released on drop.
struct Slot(Arc<AtomicUsize>);

impl Slot {
    fn acquire(live: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        live.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(live.clone()))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Upgrade one socket and hand it to a `ConnectionHandler`.
///
/// The upgrade is bounded by `server.handshake_timeout_ms` and abandoned on
/// shutdown. A slot is taken only once the request is about to be accepted,
/// so idle or half-open sockets never count against the limit.
async fn serve_socket(
    mut stream: TcpStream,
    broadcaster: Arc<Broadcaster>,
    settings: Settings,
    live: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) -> Result<(), RelayError> {
    let max_connections = settings.server.max_connections;
    let handshake_timeout = settings.server.handshake_timeout();

    let mut slot: Option<Slot> = None;
    let mut requested: Option<Result<String, HandshakeError>> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let Some(acquired) = Slot::acquire(&live, max_connections) else {
            return Err(handshake::rejection(
                StatusCode::SERVICE_UNAVAILABLE,
                "too many connections",
            ));
        };
        slot = Some(acquired);
        requested = Some(handshake::topic_from_request(req));
        Ok(resp)
    };

    // Handshake on a borrowed stream so a 400 can still be written on failure.
    let upgraded = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("shutdown during handshake");
            return Ok(());
        }
        result = tokio::time::timeout(handshake_timeout, accept_hdr_async(&mut stream, callback)) => {
            match result {
                Ok(upgraded) => upgraded.map(drop),
                Err(_) => return Err(HandshakeError::TimedOut(handshake_timeout).into()),
            }
        }
    };
    if let Err(e) = upgraded {
        if handshake::is_not_upgrade(&e) {
            warn!(error = %e, "rejecting non-upgrade request");
            stream.write_all(BAD_REQUEST_RESPONSE).await?;
            stream.shutdown().await?;
            return Err(HandshakeError::NotUpgrade.into());
        }
        return Err(e.into());
    }
    // Held until the handler returns.
    let _slot = slot;

    let topic = match requested.unwrap_or(Err(HandshakeError::MissingTopic)) {
        Ok(topic) => topic,
        // Accepted anyway; the handler closes it with a policy violation.
        Err(HandshakeError::MissingTopic) => String::new(),
        Err(e) => return Err(e.into()),
    };

    let relay = settings.relay;
    let ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
    let (conn, outbound) = Connection::new(topic, relay.outbound_buffer);
    let handler = ConnectionHandler::new(Arc::new(conn), broadcaster, relay, shutdown);
    handler.run(ws, outbound).await;
    Ok(())
}

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Where the server listens and how many live connections it accepts.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    /// Upper bound on the websocket upgrade of a freshly accepted socket.
    pub handshake_timeout_ms: u64,
}

impl ServerSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Fan-out and per-connection behaviour.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Whether a sender receives its own messages.
    pub echo_to_sender: bool,
    pub send_welcome: bool,
    pub send_timeout_ms: u64,
    pub outbound_buffer: usize,
    pub close_timeout_ms: u64,
}

impl RelaySettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub echo_to_sender: Option<bool>,
    pub send_welcome: Option<bool>,
    pub send_timeout_ms: Option<u64>,
    pub outbound_buffer: Option<usize>,
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_connections: 1000,
                handshake_timeout_ms: 10_000,
            },
            relay: RelaySettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            echo_to_sender: false,
            send_welcome: true,
            send_timeout_ms: 5000,
            outbound_buffer: 64,
            close_timeout_ms: 1000,
        }
    }
}

impl PartialSettings {
    /// Fills every missing field from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server;
        let relay = self.relay;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(defaults.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(defaults.server.port),
                max_connections: server
                    .as_ref()
                    .and_then(|s| s.max_connections)
                    .unwrap_or(defaults.server.max_connections),
                handshake_timeout_ms: server
                    .as_ref()
                    .and_then(|s| s.handshake_timeout_ms)
                    .unwrap_or(defaults.server.handshake_timeout_ms),
            },
            relay: RelaySettings {
                echo_to_sender: relay
                    .as_ref()
                    .and_then(|r| r.echo_to_sender)
                    .unwrap_or(defaults.relay.echo_to_sender),
                send_welcome: relay
                    .as_ref()
                    .and_then(|r| r.send_welcome)
                    .unwrap_or(defaults.relay.send_welcome),
                send_timeout_ms: relay
                    .as_ref()
                    .and_then(|r| r.send_timeout_ms)
                    .unwrap_or(defaults.relay.send_timeout_ms),
                outbound_buffer: relay
                    .as_ref()
                    .and_then(|r| r.outbound_buffer)
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.relay.outbound_buffer),
                close_timeout_ms: relay
                    .as_ref()
                    .and_then(|r| r.close_timeout_ms)
                    .unwrap_or(defaults.relay.close_timeout_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(defaults.log.level),
            },
        }
    }
}

//! Fan-out of one text message to every member of a topic.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::Utf8Bytes;

use crate::broker::registry::Registry;
use crate::client::ConnectionId;

/// Outcome of a single `publish`. Delivery is best-effort, so this is
/// informational only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `message` to the members of `topic` as of this call, skipping
    /// `exclude` when given.
    ///
    /// A recipient whose send fails or times out is removed from the topic
    /// and told to terminate; the remaining recipients are unaffected.
    pub async fn publish(
        &self,
        topic: &str,
        message: impl Into<Utf8Bytes>,
        exclude: Option<&ConnectionId>,
    ) -> DeliveryReport {
        let recipients: Vec<_> = self
            .registry
            .snapshot(topic)
            .into_iter()
            .filter(|conn| Some(&conn.id) != exclude)
            .collect();

        let mut report = DeliveryReport {
            attempted: recipients.len(),
            ..DeliveryReport::default()
        };
        if recipients.is_empty() {
            debug!(topic, "no recipients");
            return report;
        }

        let frame = WsMessage::Text(message.into());
        let sends = recipients.iter().map(|conn| {
            let frame = frame.clone();
            async move { (conn, conn.send(frame, self.send_timeout).await) }
        });

        for (conn, result) in join_all(sends).await {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(conn_id = %conn.id, topic, error = %e, "delivery failed, dropping recipient");
                    self.registry.leave(topic, &conn.id);
                    conn.terminate();
                }
            }
        }

        debug!(
            topic,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }
}

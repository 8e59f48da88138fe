//! Topic membership.
//!
//! The registry is the only structure shared between connection tasks. All
//! reads and writes go through one `Mutex`, held for the map update only;
//! callers receive cloned snapshots and do their I/O after the guard is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::broker::topic::Topic;
use crate::client::{Connection, ConnectionId};
use crate::utils::RelayError;

#[derive(Debug, Default)]
struct Membership {
    topics: HashMap<String, Topic>,
    /// Which topic each registered connection belongs to.
    assignments: HashMap<ConnectionId, String>,
}

#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Membership>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Membership> {
        // Critical sections never panic halfway through an update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `conn` to `topic`, creating the topic on first join.
    ///
    /// Joining the same topic twice is a no-op. A `topic` other than the one
    /// the connection is bound to is an `InvariantViolation`.
    pub fn join(&self, topic: &str, conn: Arc<Connection>) -> Result<(), RelayError> {
        if topic != conn.topic {
            return Err(invariant_violation(format!(
                "connection {} is bound to topic '{}', refusing '{}'",
                conn.id, conn.topic, topic
            )));
        }

        let mut inner = self.lock();
        if inner.assignments.contains_key(&conn.id) {
            return Ok(());
        }

        inner.assignments.insert(conn.id.clone(), topic.to_string());
        let entry = inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));
        entry.subscribe(conn.clone());
        debug!(conn_id = %conn.id, topic, members = entry.members.len(), "joined topic");
        Ok(())
    }

    /// Removes `id` from `topic` and drops the topic once it is empty.
    /// Unknown connections and topics are ignored.
    pub fn leave(&self, topic: &str, id: &ConnectionId) {
        let mut inner = self.lock();

        let removed = match inner.topics.get_mut(topic) {
            Some(entry) => {
                let removed = entry.unsubscribe(id);
                if entry.is_empty() {
                    inner.topics.remove(topic);
                    debug!(topic, "topic pruned");
                }
                removed
            }
            None => false,
        };

        if removed {
            inner.assignments.remove(id);
            debug!(conn_id = %id, topic, "left topic");
        }
    }

    /// Point-in-time copy of `topic`'s members in join order.
    pub fn snapshot(&self, topic: &str) -> Vec<Arc<Connection>> {
        self.lock()
            .topics
            .get(topic)
            .map(|entry| entry.members.clone())
            .unwrap_or_default()
    }

    /// Names of all topics that currently have members.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().topics.contains_key(topic)
    }

    pub fn member_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.members.len())
    }

    /// Topic `id` is currently registered under, if any.
    pub fn topic_of(&self, id: &ConnectionId) -> Option<String> {
        self.lock().assignments.get(id).cloned()
    }

    /// Total number of registered connections across all topics.
    pub fn connection_count(&self) -> usize {
        self.lock().assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().topics.is_empty()
    }
}

/// Logs a broken membership invariant; panics in debug builds.
fn invariant_violation(msg: String) -> RelayError {
    error!("{msg}");
    if cfg!(debug_assertions) {
        panic!("invariant violation: {msg}");
    }
    RelayError::InvariantViolation(msg)
}

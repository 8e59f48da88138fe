use std::sync::Arc;

use crate::client::{Connection, ConnectionId};

/// Members of one topic, kept in join order.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub members: Vec<Arc<Connection>>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
        }
    }

    /// Adds `conn` unless a connection with the same id is already a member.
    pub fn subscribe(&mut self, conn: Arc<Connection>) {
        if !self.contains(&conn.id) {
            self.members.push(conn);
        }
    }

    /// Removes the member with `id`. Returns whether anything was removed.
    pub fn unsubscribe(&mut self, id: &ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| &member.id != id);
        self.members.len() != before
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.iter().any(|member| &member.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

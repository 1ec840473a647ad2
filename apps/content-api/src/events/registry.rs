//! Subscriber identity → live mailboxes.

use dashmap::DashMap;
use quill_common::id::{prefix, prefixed_ulid};

use super::mailbox::{mailbox, MailboxReceiver, MailboxSender, DEFAULT_MAILBOX_CAPACITY};

/// Shared registry of every open event stream in the process.
///
/// An identity has an entry if and only if at least one mailbox is registered
/// for it. `DashMap` holds the shard lock for the duration of each
/// append/remove/delete-if-empty, so those steps never interleave for a key.
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<MailboxSender>>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Registry whose mailboxes each hold `capacity` envelopes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a mailbox for `identity` and register its sending half.
    pub fn subscribe(&self, identity: &str) -> MailboxReceiver {
        let (tx, rx) = mailbox(prefixed_ulid(prefix::CONNECTION), self.capacity);
        self.connections
            .entry(identity.to_string())
            .or_default()
            .push(tx);
        tracing::debug!(
            user_id = %identity,
            connection_id = %rx.connection_id(),
            "mailbox registered"
        );
        rx
    }

    /// Remove a mailbox. Returns `false` if it was not registered, which
    /// includes a second call for the same mailbox.
    pub fn unsubscribe(&self, identity: &str, connection_id: &str) -> bool {
        let Some(mut list) = self.connections.get_mut(identity) else {
            return false;
        };
        let before = list.len();
        list.retain(|m| m.connection_id() != connection_id);
        let removed = list.len() != before;
        let now_empty = list.is_empty();
        drop(list);

        // Re-checked under the shard lock: a subscribe may have landed in between.
        if now_empty {
            self.connections.remove_if(identity, |_, list| list.is_empty());
        }
        if removed {
            tracing::debug!(user_id = %identity, %connection_id, "mailbox removed");
        }
        removed
    }

    /// Copy of the identity's current mailboxes, safe to iterate while
    /// other tasks subscribe or unsubscribe.
    pub fn snapshot(&self, identity: &str) -> Vec<MailboxSender> {
        self.connections
            .get(identity)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Number of mailboxes registered for `identity`.
    pub fn connection_count(&self, identity: &str) -> usize {
        self.connections.get(identity).map_or(0, |list| list.len())
    }

    /// Number of identities with at least one mailbox.
    pub fn identity_count(&self) -> usize {
        self.connections.len()
    }

    /// Drop every registered sender. Open sessions drain what is already
    /// queued and then close.
    pub fn shutdown(&self) {
        let identities = self.connections.len();
        self.connections.clear();
        tracing::info!(identities, "connection registry shut down");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

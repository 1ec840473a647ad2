//! Fan-out of envelopes to every open stream of a subscriber.
//!
//! Delivery is best effort. A mailbox that cannot take an envelope right now
//! (full or closed) is evicted on the spot and delivery continues with the
//! rest. Nothing is reported back to the publisher.

use std::sync::Arc;

use super::envelope::{ContentStatusUpdate, Envelope, EventKind};
use super::registry::ConnectionRegistry;

/// Publishes events to the mailboxes in a [`ConnectionRegistry`].
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Stamp `kind` into one envelope and enqueue it for every mailbox of
    /// `identity`. No-op when the identity has no open streams.
    pub fn broadcast(&self, identity: &str, kind: EventKind) {
        let targets = self.registry.snapshot(identity);
        if targets.is_empty() {
            return;
        }

        let envelope = Arc::new(Envelope::new(kind));
        let mut delivered = 0usize;
        for mailbox in &targets {
            match mailbox.try_deliver(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    tracing::warn!(
                        user_id = %identity,
                        connection_id = %mailbox.connection_id(),
                        %reason,
                        "evicting mailbox after failed delivery"
                    );
                    self.registry.unsubscribe(identity, mailbox.connection_id());
                }
            }
        }

        tracing::debug!(
            user_id = %identity,
            envelope_id = %envelope.id,
            event_type = envelope.kind.name(),
            recipients = targets.len(),
            delivered,
            "broadcast event"
        );
    }

    /// Publish a `content_status_update` for one content item.
    pub fn notify_status(
        &self,
        identity: &str,
        content_id: &str,
        status: &str,
        title: Option<&str>,
        error_message: Option<&str>,
        progress: Option<f64>,
    ) {
        let update = ContentStatusUpdate {
            content_id: content_id.to_string(),
            status: status.to_string(),
            title: title.map(str::to_string),
            error_message: error_message.map(str::to_string),
            progress,
        };
        self.broadcast(identity, EventKind::ContentStatusUpdate(update));
    }
}

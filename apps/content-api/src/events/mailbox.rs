//! Bounded per-connection mailbox.
//!
//! The sending half lives in the [`ConnectionRegistry`](super::registry::ConnectionRegistry)
//! and is only ever used with non-blocking enqueue. The receiving half is owned
//! by exactly one stream session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::envelope::Envelope;

/// Envelopes a mailbox holds before further deliveries fail.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Why an envelope could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    /// The consumer has not drained the buffer.
    #[error("mailbox full")]
    Full,
    /// The receiving session is gone.
    #[error("mailbox closed")]
    Closed,
}

/// Create a connected mailbox pair. A capacity of 0 is treated as 1.
pub fn mailbox(connection_id: String, capacity: usize) -> (MailboxSender, MailboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let connection_id: Arc<str> = connection_id.into();
    (
        MailboxSender {
            connection_id: connection_id.clone(),
            tx,
        },
        MailboxReceiver { connection_id, rx },
    )
}

/// Registry-side handle. Cheap to clone for fan-out snapshots.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    connection_id: Arc<str>,
    tx: mpsc::Sender<Arc<Envelope>>,
}

impl MailboxSender {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Enqueue without waiting.
    pub fn try_deliver(&self, envelope: Arc<Envelope>) -> Result<(), DeliveryFailure> {
        self.tx.try_send(envelope).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Session-side handle.
#[derive(Debug)]
pub struct MailboxReceiver {
    connection_id: Arc<str>,
    rx: mpsc::Receiver<Arc<Envelope>>,
}

impl MailboxReceiver {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Next envelope in enqueue order. Returns `None` once every sender has
    /// been dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }
}

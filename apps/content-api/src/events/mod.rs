//! Real-time content event broadcast.
//!
//! Producers call [`Broadcaster::notify_status`]; each open event stream owns a
//! bounded mailbox in the [`ConnectionRegistry`] and drains it through a
//! [`StreamSession`].

pub mod broadcaster;
pub mod envelope;
pub mod mailbox;
pub mod registry;
pub mod session;

pub use broadcaster::Broadcaster;
pub use envelope::{ContentStatusUpdate, Envelope, EventKind};
pub use registry::ConnectionRegistry;
pub use session::{SessionConfig, StreamSession};

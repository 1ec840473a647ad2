//! Per-connection stream session.
//!
//! ```text
//! Init ──subscribe, emit connection_established──▶ Streaming ──▶ Closed
//!   │                                                ▲   │
//!   └──────────── bounded mode ──────────────────────┘   └─ envelope / heartbeat
//! ```
//!
//! The mailbox is held by a [`Subscription`] guard, so it is released exactly
//! once whichever way the session ends: normal close, a closed mailbox, or the
//! consumer dropping the stream mid-wait.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};

use super::envelope::Envelope;
use super::mailbox::MailboxReceiver;
use super::registry::ConnectionRegistry;

/// Idle time after which a heartbeat is emitted.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    /// Close right after the `connection_established` envelope. Keeps test
    /// clients from waiting on an endless stream.
    pub bounded: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            bounded: false,
        }
    }
}

/// Scoped ownership of one registered mailbox. Dropping it unsubscribes.
pub struct Subscription {
    registry: Arc<ConnectionRegistry>,
    identity: String,
    mailbox: MailboxReceiver,
}

impl Subscription {
    pub fn new(registry: Arc<ConnectionRegistry>, identity: &str) -> Self {
        let mailbox = registry.subscribe(identity);
        Self {
            registry,
            identity: identity.to_string(),
            mailbox,
        }
    }

    pub fn connection_id(&self) -> &str {
        self.mailbox.connection_id()
    }

    async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.mailbox.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self
            .registry
            .unsubscribe(&self.identity, self.mailbox.connection_id());
        tracing::info!(
            user_id = %self.identity,
            connection_id = %self.mailbox.connection_id(),
            was_registered = removed,
            "event stream closed"
        );
    }
}

enum SessionState {
    Init,
    Streaming(Subscription),
    Closed,
}

/// State machine draining one subscriber's mailbox.
pub struct StreamSession {
    registry: Arc<ConnectionRegistry>,
    identity: String,
    config: SessionConfig,
    state: SessionState,
}

impl StreamSession {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        identity: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            identity: identity.into(),
            config,
            state: SessionState::Init,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// Advance the state machine. `None` means the session is closed.
    ///
    /// The only suspension point is the mailbox wait in `Streaming`; dropping
    /// the future there cancels the session and releases the mailbox.
    pub async fn next_envelope(&mut self) -> Option<Arc<Envelope>> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Init => {
                let subscription = Subscription::new(self.registry.clone(), &self.identity);
                tracing::info!(
                    user_id = %self.identity,
                    connection_id = %subscription.connection_id(),
                    bounded = self.config.bounded,
                    "event stream opened"
                );
                if !self.config.bounded {
                    self.state = SessionState::Streaming(subscription);
                }
                Some(Arc::new(Envelope::connection_established()))
            }
            SessionState::Streaming(mut subscription) => {
                let waited =
                    tokio::time::timeout(self.config.heartbeat_interval, subscription.recv()).await;
                match waited {
                    Ok(Some(envelope)) => {
                        self.state = SessionState::Streaming(subscription);
                        Some(envelope)
                    }
                    Ok(None) => {
                        tracing::debug!(
                            user_id = %self.identity,
                            connection_id = %subscription.connection_id(),
                            "mailbox closed, ending stream"
                        );
                        None
                    }
                    Err(_elapsed) => {
                        tracing::debug!(
                            user_id = %self.identity,
                            connection_id = %subscription.connection_id(),
                            "idle, sending heartbeat"
                        );
                        self.state = SessionState::Streaming(subscription);
                        Some(Arc::new(Envelope::heartbeat()))
                    }
                }
            }
            SessionState::Closed => None,
        }
    }

    /// Envelopes in emission order, ending when the session closes.
    pub fn into_stream(self) -> impl Stream<Item = Arc<Envelope>> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            let envelope = session.next_envelope().await?;
            Some((envelope, session))
        })
    }

    /// Like [`into_stream`](Self::into_stream), framed as `data: <json>\n\n`.
    pub fn into_frames(self) -> impl Stream<Item = String> + Send + 'static {
        futures_util::StreamExt::map(self.into_stream(), |envelope| envelope.to_sse_frame())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{FutureExt, StreamExt};

    use super::*;
    use crate::events::broadcaster::Broadcaster;
    use crate::events::envelope::EventKind;

    fn setup() -> (Arc<ConnectionRegistry>, Broadcaster) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        (registry, broadcaster)
    }

    fn streaming_config() -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(30),
            bounded: false,
        }
    }

    fn assert_within_tick(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    #[tokio::test]
    async fn first_envelope_is_connection_established() {
        let (registry, _) = setup();
        let mut session = StreamSession::new(registry.clone(), "u1", streaming_config());

        let first = session.next_envelope().await.unwrap();
        assert_eq!(first.kind, EventKind::ConnectionEstablished);
        assert_eq!(registry.connection_count("u1"), 1);
    }

    #[tokio::test]
    async fn bounded_mode_closes_after_init() {
        let (registry, _) = setup();
        let config = SessionConfig {
            bounded: true,
            ..streaming_config()
        };
        let frames: Vec<_> = StreamSession::new(registry.clone(), "u1", config)
            .into_stream()
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, EventKind::ConnectionEstablished);
        assert_eq!(registry.identity_count(), 0);
    }

    #[tokio::test]
    async fn forwards_broadcast_events() {
        let (registry, broadcaster) = setup();
        let mut session = StreamSession::new(registry, "u1", streaming_config());
        session.next_envelope().await.unwrap();

        broadcaster.notify_status("u1", "c1", "processing", None, None, Some(0.5));

        let env = session.next_envelope().await.unwrap();
        assert_eq!(env.kind.name(), "content_status_update");
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_after_idle_interval_and_repeats() {
        let (registry, _) = setup();
        let mut session = StreamSession::new(registry.clone(), "u1", streaming_config());
        session.next_envelope().await.unwrap();

        let started = tokio::time::Instant::now();
        let first = session.next_envelope().await.unwrap();
        assert_eq!(first.kind, EventKind::Heartbeat);
        assert_within_tick(started.elapsed(), Duration::from_secs(30));

        let second = session.next_envelope().await.unwrap();
        assert_eq!(second.kind, EventKind::Heartbeat);
        assert_ne!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_within_tick(started.elapsed(), Duration::from_secs(60));

        assert!(!session.is_closed());
        assert_eq!(registry.connection_count("u1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_heartbeat_before_interval() {
        let (registry, _) = setup();
        let mut session = StreamSession::new(registry, "u1", streaming_config());
        session.next_envelope().await.unwrap();

        let started = tokio::time::Instant::now();
        let mut wait = Box::pin(session.next_envelope());
        assert!((&mut wait).now_or_never().is_none());
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!((&mut wait).now_or_never().is_none());

        let heartbeat = wait.await.unwrap();
        assert_eq!(heartbeat.kind, EventKind::Heartbeat);
        assert_within_tick(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn dropping_idle_stream_releases_mailbox() {
        let (registry, _) = setup();
        let mut stream =
            Box::pin(StreamSession::new(registry.clone(), "u1", streaming_config()).into_stream());
        stream.next().await.unwrap();
        assert_eq!(registry.connection_count("u1"), 1);

        drop(stream);
        assert_eq!(registry.identity_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_mid_wait_releases_mailbox() {
        let (registry, _) = setup();
        let mut session = StreamSession::new(registry.clone(), "u1", streaming_config());
        session.next_envelope().await.unwrap();

        {
            let wait = session.next_envelope();
            let cancelled = tokio::time::timeout(Duration::from_millis(10), wait).await;
            assert!(cancelled.is_err());
        }

        // Cancelled while suspended: the guard went with the future.
        assert!(session.is_closed());
        assert_eq!(registry.identity_count(), 0);
        assert!(session.next_envelope().await.is_none());
    }

    #[tokio::test]
    async fn cancelling_after_events_leaves_sibling_intact() {
        let (registry, broadcaster) = setup();
        let mut keep = StreamSession::new(registry.clone(), "u1", streaming_config());
        keep.next_envelope().await.unwrap();

        let mut stream =
            Box::pin(StreamSession::new(registry.clone(), "u1", streaming_config()).into_stream());
        stream.next().await.unwrap();
        broadcaster.notify_status("u1", "c1", "processing", None, None, None);
        assert_eq!(stream.next().await.unwrap().kind.name(), "content_status_update");
        assert_eq!(registry.connection_count("u1"), 2);

        drop(stream);
        assert_eq!(registry.connection_count("u1"), 1);

        broadcaster.notify_status("u1", "c1", "completed", None, None, None);
        assert_eq!(keep.next_envelope().await.unwrap().kind.name(), "content_status_update");
    }

    #[tokio::test]
    async fn evicted_session_drains_then_closes() {
        let registry = Arc::new(ConnectionRegistry::with_capacity(2));
        let broadcaster = Broadcaster::new(registry.clone());
        let mut session = StreamSession::new(registry.clone(), "u1", streaming_config());
        session.next_envelope().await.unwrap();

        for i in 0..3 {
            broadcaster.notify_status("u1", &format!("c{i}"), "processing", None, None, None);
        }
        assert_eq!(registry.identity_count(), 0);

        assert!(session.next_envelope().await.is_some());
        assert!(session.next_envelope().await.is_some());
        assert!(session.next_envelope().await.is_none());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn frames_are_data_lines() {
        let (registry, _) = setup();
        let config = SessionConfig {
            bounded: true,
            ..streaming_config()
        };
        let frames: Vec<String> = StreamSession::new(registry, "u1", config)
            .into_frames()
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("data: "));
        assert!(frames[0].contains("\"type\":\"connection_established\""));
        assert!(frames[0].ends_with("\n\n"));
    }
}

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use events::{Broadcaster, ConnectionRegistry};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    /// Open event streams, keyed by user ID.
    pub registry: Arc<ConnectionRegistry>,
    /// Publishes content events into `registry`.
    pub broadcaster: Broadcaster,
}

impl AppState {
    /// Build state with a fresh connection registry sized from `config`.
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_capacity(config.mailbox_capacity));
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            kv,
            config: Arc::new(config),
            registry,
            broadcaster,
        }
    }
}

use std::time::Duration;

use crate::events::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::events::session::{SessionConfig, DEFAULT_HEARTBEAT_INTERVAL};

/// Content API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Envelopes buffered per event stream before it is dropped as too slow.
    pub mailbox_capacity: usize,
    /// Idle time before an event stream emits a heartbeat.
    pub heartbeat_interval: Duration,
    /// Close event streams right after the initial acknowledgement.
    pub bounded_streams: bool,
    /// `(token, user_id)` pairs seeded into the token store at startup.
    pub auth_tokens: Vec<(String, String)>,
}

impl Config {
    /// Load configuration from environment variables. Every variable is
    /// optional; unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT").unwrap_or(4100),
            mailbox_capacity: parsed_var("SSE_MAILBOX_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_MAILBOX_CAPACITY),
            heartbeat_interval: parsed_var("SSE_HEARTBEAT_INTERVAL_SECS")
                .filter(|&n: &u64| n > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            bounded_streams: std::env::var("SSE_BOUNDED_STREAMS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            auth_tokens: std::env::var("AUTH_TOKENS")
                .map(|v| parse_token_pairs(&v))
                .unwrap_or_default(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: self.heartbeat_interval,
            bounded: self.bounded_streams,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4100,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            bounded_streams: false,
            auth_tokens: Vec::new(),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Parse `token=user_id,token=user_id`. Malformed pairs are skipped.
fn parse_token_pairs(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parsed = pair
                .split_once('=')
                .map(|(token, user)| (token.trim(), user.trim()))
                .filter(|(token, user)| !token.is_empty() && !user.is_empty());
            if parsed.is_none() {
                tracing::warn!(pair, "ignoring malformed AUTH_TOKENS entry");
            }
            parsed.map(|(token, user)| (token.to_string(), user.to_string()))
        })
        .collect()
}

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;

use content_api::auth::tokens::{self, AccessTokenData, ACCESS_TOKEN_TTL_SECS};
use content_api::config::Config;
use content_api::db::kv::{KeyValueStore, MemoryStore};
use content_api::AppState;

/// Build a test AppState with in-memory KV and the given stream settings.
pub fn test_state(config: Config) -> AppState {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    AppState::new(config, kv)
}

/// Config whose streams close right after the initial acknowledgement.
pub fn bounded_config() -> Config {
    Config {
        bounded_streams: true,
        ..Config::default()
    }
}

/// Config with long-lived streams and a short heartbeat.
pub fn streaming_config(heartbeat: Duration) -> Config {
    Config {
        heartbeat_interval: heartbeat,
        ..Config::default()
    }
}

/// Register `token` for `user_id` and return it.
pub async fn issue_token(state: &AppState, token: &str, user_id: &str) -> String {
    let data = AccessTokenData {
        user_id: user_id.to_string(),
    };
    tokens::store_access_token(state.kv.as_ref(), token, &data, ACCESS_TOKEN_TTL_SECS)
        .await
        .expect("store token");
    token.to_string()
}

/// Build the full application router wired to `state`.
pub fn test_app(state: &AppState) -> Router {
    content_api::routes::router().with_state(state.clone())
}

/// Start an actual TCP server for streaming tests. The server runs in the background.
pub async fn start_server(state: &AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Splits a `text/event-stream` body into `data:` payloads.
pub struct FrameReader {
    body: futures_util::stream::BoxStream<'static, reqwest::Result<axum::body::Bytes>>,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            buffer: Vec::new(),
        }
    }

    /// Next frame parsed as JSON, or `None` if the stream ended.
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        loop {
            if let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
                let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
                let frame = String::from_utf8(frame).expect("utf-8 frame");
                let json = frame
                    .strip_prefix("data: ")
                    .expect("frame starts with data:")
                    .trim_end();
                return Some(serde_json::from_str(json).expect("frame is JSON"));
            }
            let chunk = self.body.next().await?.expect("body chunk");
            self.buffer.extend_from_slice(&chunk);
        }
    }

    /// Like `next_json`, failing the test after `limit`.
    pub async fn next_json_within(&mut self, limit: Duration) -> serde_json::Value {
        tokio::time::timeout(limit, self.next_json())
            .await
            .expect("frame before timeout")
            .expect("stream still open")
    }
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

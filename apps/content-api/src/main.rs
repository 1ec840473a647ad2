use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use content_api::auth::tokens::{self, AccessTokenData, SEEDED_TOKEN_TTL_SECS};
use content_api::config::Config;
use content_api::db::kv::{KeyValueStore, MemoryStore};
use content_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file; skipped if missing since env vars may be set externally.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    for (token, user_id) in &config.auth_tokens {
        let data = AccessTokenData {
            user_id: user_id.clone(),
        };
        if let Err(err) =
            tokens::store_access_token(kv.as_ref(), token, &data, SEEDED_TOKEN_TTL_SECS).await
        {
            tracing::warn!(%user_id, message = %err.message, "failed to seed access token");
        }
    }

    tracing::info!(
        mailbox_capacity = config.mailbox_capacity,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        bounded_streams = config.bounded_streams,
        seeded_tokens = config.auth_tokens.len(),
        "content-api configured"
    );

    let state = AppState::new(config, kv);
    let registry = state.registry.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(content_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "content-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .expect("server error");

    tracing::info!("content-api stopped");
}

/// Resolves on Ctrl-C. Closes every open event stream first so graceful
/// shutdown is not held up by long-lived responses.
async fn shutdown_signal(registry: Arc<content_api::events::ConnectionRegistry>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    registry.shutdown();
}

//! Event stream endpoints.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::ApiErrorBody;
use crate::events::{Envelope, StreamSession};
use crate::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/stream", get(stream_events))
        .route("/events/connections", get(list_connections))
}

// ---------------------------------------------------------------------------
// GET /api/v1/events/stream
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/events/stream",
    tag = "Events",
    security(("bearer" = [])),
    params(
        ("token" = Option<String>, Query, description = "Access token, when no Authorization header is sent"),
    ),
    responses(
        (status = 200, description = "Server-sent events, one `data: <json>` frame per envelope", content_type = "text/event-stream", body = Envelope),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn stream_events(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Response {
    let session = StreamSession::new(state.registry.clone(), user_id, state.config.session_config());
    let frames = session.into_frames().map(Ok::<_, Infallible>);

    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /api/v1/events/connections
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionsResponse {
    pub user_id: String,
    /// Event streams currently open for this user.
    pub connections: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/events/connections",
    tag = "Events",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Open event streams for the caller", body = ConnectionsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_connections(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Json<ConnectionsResponse> {
    let connections = state.registry.connection_count(&user_id);
    Json(ConnectionsResponse {
        user_id,
        connections,
    })
}

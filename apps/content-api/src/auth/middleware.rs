//! Bearer token extraction.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::tokens;
use crate::AppState;

/// Authenticated user resolved from an access token.
///
/// The token comes from `Authorization: Bearer <token>`, or from the `token`
/// query parameter when no header is sent (browser `EventSource` cannot set
/// headers).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Rejection returned when the token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, AuthError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header.to_str().map_err(|_| AuthError {
        message: "Invalid Authorization header format",
    })?;
    let token = header.strip_prefix("Bearer ").ok_or(AuthError {
        message: "Invalid Authorization header format",
    })?;
    Ok(Some(token.to_string()))
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts)? {
            Some(token) => token,
            None => query_token(parts).ok_or(AuthError {
                message: "Missing access token",
            })?,
        };

        let data = tokens::lookup_access_token(state.kv.as_ref(), &token)
            .await
            .map_err(|_| AuthError {
                message: "Token lookup failed",
            })?
            .ok_or(AuthError {
                message: "Invalid or expired token",
            })?;

        Ok(AuthUser {
            user_id: data.user_id,
        })
    }
}

//! Access tokens deposited by the auth layer.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Access token TTL in seconds (1 hour).
pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;

/// TTL used for tokens seeded from configuration (10 years).
pub const SEEDED_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Data stored alongside an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenData {
    pub user_id: String,
}

fn key(token: &str) -> String {
    format!("content:at:{token}")
}

pub async fn store_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &AccessTokenData,
    ttl_secs: u64,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data).map_err(|_| ApiError::internal("serialization"))?;
    kv.set_ex(&key(token), &value, ttl_secs).await
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<AccessTokenData>, ApiError> {
    match kv.get(&key(token)).await? {
        Some(v) => {
            let data: AccessTokenData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt token data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

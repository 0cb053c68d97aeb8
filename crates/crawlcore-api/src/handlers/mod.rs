pub mod crawl;
pub mod health;
pub mod scrape;
pub mod search;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::{ApiError, ApiResult};
use crawlcore_types::ports::external::AuthContext;

/// Pulls the bearer API key from `Authorization` and resolves it via
/// the injected `Auth` port (spec.md §6.1).
pub async fn authenticate(
    state: &crate::state::AppState,
    headers: &HeaderMap,
) -> ApiResult<AuthContext> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let api_key = raw.strip_prefix("Bearer ").unwrap_or(raw);
    Ok(state.auth.authenticate(api_key).await?)
}

/// `x-idempotency-key` header, if present and well-formed (spec.md
/// §4.8).
pub fn idempotency_header(headers: &HeaderMap) -> ApiResult<Option<Uuid>> {
    match headers.get("x-idempotency-key") {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::validation("x-idempotency-key must be ASCII"))?;
            let key = Uuid::parse_str(raw)
                .map_err(|_| ApiError::validation("x-idempotency-key must be a UUID"))?;
            Ok(Some(key))
        }
    }
}

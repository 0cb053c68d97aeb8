//! `ApiError` (spec.md §6.2, §7): the HTTP-facing error type.
//!
//! Grounded on `riptide-api/src/errors.rs`: one enum variant per failure
//! mode, a `status_code()`/`error_type()` pair, an `IntoResponse` impl
//! that logs at a severity matched to the status class, and `From`
//! impls from the crates that actually produce these errors at the
//! boundary. The variant set itself is this spec's own (§7's classified
//! error kinds plus transport-level additions), not copied from the
//! teacher's web-scraping-specific list.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crawlcore_types::error::CoreError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("blocked URL: {0}")]
    Blocked(String),

    #[error("insufficient credits: requested {requested}, remaining {remaining}")]
    InsufficientCredits { requested: u64, remaining: u64 },

    #[error("Idempotency key already used")]
    IdempotencyConflict,

    #[error("request timed out")]
    RequestTimeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry later")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    /// Maps to spec.md §6.2's exit-code table.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Blocked(_) => StatusCode::FORBIDDEN,
            ApiError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::IdempotencyConflict => StatusCode::CONFLICT,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Auth(_) => "auth_error",
            ApiError::Blocked(_) => "blocked_url",
            ApiError::InsufficientCredits { .. } => "insufficient_credits",
            ApiError::IdempotencyConflict => "idempotency_conflict",
            ApiError::RequestTimeout => "request_timeout",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RequestTimeout | ApiError::RateLimited)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        match status {
            StatusCode::INTERNAL_SERVER_ERROR => error!(error = %self, "internal API error"),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(error = %self, "request rejected")
            }
            _ => {}
        }

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
                "status": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

/// Maps the core's classified errors onto the API's transport-level
/// ones (spec.md §7's propagation policy carried through to §6.2's exit
/// codes).
impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => ApiError::Validation(msg),
            CoreError::Auth(msg) => ApiError::Auth(msg),
            CoreError::Blocked(msg) => ApiError::Blocked(msg),
            CoreError::InsufficientCredits {
                requested,
                remaining,
                ..
            } => ApiError::InsufficientCredits {
                requested,
                remaining,
            },
            CoreError::Idempotency(_) => ApiError::IdempotencyConflict,
            CoreError::Timeout(_) => ApiError::RequestTimeout,
            CoreError::NotFound(msg) => ApiError::NotFound(msg),
            CoreError::RateLimited(_) => ApiError::RateLimited,
            CoreError::TransientNetwork(msg) => ApiError::Internal(msg),
            CoreError::PermanentFetch(code) => ApiError::Internal(format!("upstream {code}")),
            CoreError::InternalLogic(msg) => ApiError::Internal(msg),
            CoreError::Cancelled => ApiError::Internal("cancelled".into()),
            CoreError::Kv(msg) => ApiError::Internal(msg),
            CoreError::InvalidTransition { from, to } => {
                ApiError::Internal(format!("invalid state transition {from} -> {to}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(ApiError::validation("bad").status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn idempotency_conflict_maps_to_409() {
        assert_eq!(ApiError::IdempotencyConflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn core_idempotency_error_converts_to_conflict() {
        let api: ApiError = CoreError::Idempotency("req-1".into()).into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn core_insufficient_credits_preserves_fields() {
        let api: ApiError = CoreError::InsufficientCredits {
            team_id: "team-1".into(),
            requested: 10,
            remaining: 2,
        }
        .into();
        match api {
            ApiError::InsufficientCredits { requested, remaining } => {
                assert_eq!(requested, 10);
                assert_eq!(remaining, 2);
            }
            _ => panic!("expected InsufficientCredits"),
        }
    }
}

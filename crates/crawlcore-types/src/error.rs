//! Classified core error kinds, mirroring the teacher's `RiptideError`.
//!
//! The API boundary (`crawlcore-api`) layers its own `ApiError` on top
//! of this, mapping each variant to an HTTP status and log tier.

use thiserror::Error;

/// Result alias used throughout the core crates.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Classified error kinds for the crawl orchestration core.
///
/// Each variant maps to exactly one of the exit codes enumerated in
/// spec.md §6.2 and carries the retry/billing classification from §7.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("blocked URL: {0}")]
    Blocked(String),

    #[error("insufficient credits for team {team_id}: requested {requested}, remaining {remaining}")]
    InsufficientCredits {
        team_id: String,
        requested: u64,
        remaining: u64,
    },

    #[error("idempotency key already used: {0}")]
    Idempotency(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("upstream returned status {0}")]
    PermanentFetch(u16),

    #[error("internal error: {0}")]
    InternalLogic(String),

    #[error("cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("KV store error: {0}")]
    Kv(String),

    #[error("rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl CoreError {
    /// Whether an automatic retry is appropriate for this error kind.
    ///
    /// Matches spec.md §7's propagation policy: validation/auth/blocked/
    /// idempotency/permanent-fetch/cancelled never retry; timeout and
    /// transient-network do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout(_) | CoreError::TransientNetwork(_) | CoreError::RateLimited(_)
        )
    }

    /// Whether this is a client-caused (4xx-class) error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::Auth(_)
                | CoreError::Blocked(_)
                | CoreError::InsufficientCredits { .. }
                | CoreError::Idempotency(_)
                | CoreError::PermanentFetch(_)
                | CoreError::NotFound(_)
                | CoreError::RateLimited(_)
        )
    }

    /// Whether this error should be billed against the team's credits.
    ///
    /// Validation and auth failures are never billed (spec.md §7).
    pub fn is_billable(&self) -> bool {
        !matches!(
            self,
            CoreError::Validation(_) | CoreError::Auth(_) | CoreError::Idempotency(_)
        )
    }
}

impl From<url::ParseError> for CoreError {
    fn from(e: url::ParseError) -> Self {
        CoreError::Validation(format!("invalid URL: {e}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InternalLogic(format!("serialization error: {e}"))
    }
}

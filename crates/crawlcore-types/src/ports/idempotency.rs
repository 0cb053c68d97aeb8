//! Idempotency Gate port (spec.md §4.8).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// A lock token returned by a successful `try_acquire`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyToken {
    pub key: String,
    #[serde(with = "instant_as_millis")]
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyToken {
    pub fn new(key: String, ttl: Duration) -> Self {
        Self {
            key,
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

mod instant_as_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(v.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = i64::deserialize(d)?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| serde::de::Error::custom("invalid timestamp"))
    }
}

/// Deduplicates client submissions by key, with bounded TTL
/// (spec.md §4.8, ≥24h per §3).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically acquire the lock for `key`. Fails if already held.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<IdempotencyToken>;

    /// Release a previously acquired lock. Idempotent: releasing an
    /// expired or already-released token is not an error.
    async fn release(&self, token: IdempotencyToken) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Cache the result of the operation the key guarded, so a replay
    /// within the TTL window can return it instead of re-running.
    async fn store_result(&self, key: &str, result: &[u8], ttl: Duration) -> Result<()>;
    async fn get_result(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_not_expired_immediately() {
        let token = IdempotencyToken::new("k".into(), Duration::from_secs(60));
        assert!(!token.is_expired());
    }

    #[test]
    fn token_expired_with_zero_ttl() {
        let token = IdempotencyToken::new("k".into(), Duration::from_secs(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(token.is_expired());
    }
}

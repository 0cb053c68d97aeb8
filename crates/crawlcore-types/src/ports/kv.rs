//! KV Store Abstraction port (spec.md §4.1).
//!
//! Backend-agnostic trait for the single shared-state primitive the rest
//! of the core is built on. Concrete adapters (`InMemoryKvStore`,
//! `RedisKvStore`) live in `crawlcore-kv`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Shared-state primitive: get/set with TTL, atomic counters, sets,
/// lists, sorted sets, and pub/sub — the superset spec.md §4.1 requires.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, keys: &[String]) -> Result<u64>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// `SET NX` semantics: succeeds only if `key` did not already exist.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool>;

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_card(&self, key: &str) -> Result<u64>;
    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64>;
    async fn list_pop_front(&self, key: &str) -> Result<Option<String>>;
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// `LREM key 1 value` semantics: removes the first matching
    /// occurrence of `value`, wherever it sits in the list, rather than
    /// assuming it is at the head.
    async fn list_remove(&self, key: &str, value: &str) -> Result<bool>;

    /// Sorted-set add; `score` orders ascending range queries.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Publish a notice on a pub/sub channel (used for crawl cancellation).
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

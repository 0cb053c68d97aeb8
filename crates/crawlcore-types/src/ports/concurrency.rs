//! Concurrency Limiter port (spec.md §4.3), shaped after the teacher's
//! `PerHostRateLimiter` (per-host quota tracking generalized here to
//! per-team admission + overflow).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::ScrapeUnit;

/// Per-team admission controller: active leases plus an overflow queue.
#[async_trait]
pub trait ConcurrencyLimiter: Send + Sync {
    /// Admit `unit` if the team has spare capacity; otherwise push it
    /// onto the team's overflow queue. Returns `true` if admitted.
    async fn admit(&self, unit: &ScrapeUnit) -> Result<bool>;

    /// Release the lease held for `unit_id` and attempt to admit
    /// overflowed units while capacity remains (spec.md §4.3 "on
    /// completion/failure/cancel").
    async fn release(&self, team_id: &str, unit_id: Uuid) -> Result<Vec<ScrapeUnit>>;

    /// Drain as much of the overflow queue as current capacity allows.
    async fn drain_overflow(&self, team_id: &str) -> Result<Vec<ScrapeUnit>>;

    async fn get_stats(&self, team_id: &str) -> Result<ConcurrencyStats>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyStats {
    pub team_id: String,
    pub active: u64,
    pub max_concurrency: u32,
    pub overflow_depth: u64,
}

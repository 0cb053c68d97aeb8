//! Concurrency Limiter (spec.md §4.3): per-team admission with an
//! overflow queue.
//!
//! New code — the teacher has no team-level admission controller — but
//! the active-lease/overflow shape is modeled on
//! `riptide-types::ports::rate_limit::PerHostRateLimiter` (per-host
//! quota tracking generalized here to per-team), and the lease-TTL
//! idiom is carried over from `queue.rs`'s `acquire_job_lease`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crawlcore_types::error::Result;
use crawlcore_types::model::ScrapeUnit;
use crawlcore_types::ports::concurrency::{ConcurrencyLimiter, ConcurrencyStats};
use crawlcore_types::ports::kv::KvStore;

fn active_key(team_id: &str) -> String {
    format!("team:{team_id}:active")
}

fn overflow_key(team_id: &str) -> String {
    format!("team:{team_id}:overflow")
}

fn unit_blob_key(id: Uuid) -> String {
    format!("team:overflow_unit:{id}")
}

/// Per-team plan ceilings, with an env-overridable default
/// (spec.md §4.3 "`plan_limit(team)` (with env overrides)").
pub struct PlanLimits {
    default_max: u32,
    overrides: DashMap<String, u32>,
}

impl PlanLimits {
    pub fn new(default_max: u32) -> Self {
        Self {
            default_max,
            overrides: DashMap::new(),
        }
    }

    pub fn set_override(&self, team_id: &str, max: u32) {
        self.overrides.insert(team_id.to_string(), max);
    }

    pub fn max_for(&self, team_id: &str) -> u32 {
        self.overrides.get(team_id).map(|v| *v).unwrap_or(self.default_max)
    }
}

pub struct KvConcurrencyLimiter {
    kv: Arc<dyn KvStore>,
    plan_limits: Arc<PlanLimits>,
    lease_ttl: Duration,
}

impl KvConcurrencyLimiter {
    pub fn new(kv: Arc<dyn KvStore>, plan_limits: Arc<PlanLimits>, lease_ttl: Duration) -> Self {
        Self {
            kv,
            plan_limits,
            lease_ttl,
        }
    }

    /// Lease TTL derived from the unit's declared timeout plus a safety
    /// margin, so a crashed worker's lease still expires before a sane
    /// fetch would have (spec.md §4.3).
    pub fn lease_ttl_for(&self, timeout_ms: u64) -> Duration {
        let declared = Duration::from_millis(timeout_ms);
        (declared * 2).max(self.lease_ttl)
    }

    async fn evict_expired(&self, team_id: &str) -> Result<()> {
        let now = crawlcore_utils::time::now_unix_secs() as f64;
        let expired = self.kv.zrange_by_score(&active_key(team_id), f64::MIN, now).await?;
        for id in expired {
            self.kv.zrem(&active_key(team_id), &id).await?;
        }
        Ok(())
    }

    async fn active_count(&self, team_id: &str) -> Result<u64> {
        self.kv.zcard(&active_key(team_id)).await
    }
}

#[async_trait]
impl ConcurrencyLimiter for KvConcurrencyLimiter {
    #[instrument(skip(self, unit), fields(team_id = %unit.team_id, unit_id = %unit.id))]
    async fn admit(&self, unit: &ScrapeUnit) -> Result<bool> {
        let team_id = &unit.team_id;
        self.evict_expired(team_id).await?;

        let max = self.plan_limits.max_for(team_id);
        let active = self.active_count(team_id).await?;

        if active < max as u64 {
            let lease_ttl = self.lease_ttl_for(unit.scrape_options.timeout_ms);
            let expiry = crawlcore_utils::time::expiry_score_secs(lease_ttl);
            self.kv
                .zadd(&active_key(team_id), &unit.id.to_string(), expiry)
                .await?;
            debug!("admitted within concurrency limit");
            Ok(true)
        } else {
            let payload = serde_json::to_vec(unit).map_err(|e| {
                crawlcore_types::error::CoreError::InternalLogic(format!("serialize unit: {e}"))
            })?;
            self.kv.set(&unit_blob_key(unit.id), &payload, None).await?;
            self.kv.list_push_back(&overflow_key(team_id), &unit.id.to_string()).await?;
            debug!("overflowed, queued for later admission");
            Ok(false)
        }
    }

    #[instrument(skip(self))]
    async fn release(&self, team_id: &str, unit_id: Uuid) -> Result<Vec<ScrapeUnit>> {
        self.kv.zrem(&active_key(team_id), &unit_id.to_string()).await?;
        self.drain_overflow(team_id).await
    }

    #[instrument(skip(self))]
    async fn drain_overflow(&self, team_id: &str) -> Result<Vec<ScrapeUnit>> {
        self.evict_expired(team_id).await?;
        let max = self.plan_limits.max_for(team_id);
        let mut admitted = Vec::new();

        loop {
            let active = self.active_count(team_id).await?;
            if active >= max as u64 {
                break;
            }
            let Some(id_str) = self.kv.list_pop_front(&overflow_key(team_id)).await? else {
                break;
            };
            let Ok(id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            let Some(raw) = self.kv.get(&unit_blob_key(id)).await? else {
                continue;
            };
            let unit: ScrapeUnit = serde_json::from_slice(&raw).map_err(|e| {
                crawlcore_types::error::CoreError::InternalLogic(format!("deserialize unit: {e}"))
            })?;

            let lease_ttl = self.lease_ttl_for(unit.scrape_options.timeout_ms);
            let expiry = crawlcore_utils::time::expiry_score_secs(lease_ttl);
            self.kv.zadd(&active_key(team_id), &id.to_string(), expiry).await?;
            self.kv.delete(&[unit_blob_key(id)]).await?;

            admitted.push(unit);
        }

        Ok(admitted)
    }

    async fn get_stats(&self, team_id: &str) -> Result<ConcurrencyStats> {
        self.evict_expired(team_id).await?;
        Ok(ConcurrencyStats {
            team_id: team_id.to_string(),
            active: self.active_count(team_id).await?,
            max_concurrency: self.plan_limits.max_for(team_id),
            overflow_depth: self.kv.list_len(&overflow_key(team_id)).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlcore_kv::InMemoryKvStore;
    use crawlcore_types::model::ScrapeOptions;

    fn make_limiter(max: u32) -> KvConcurrencyLimiter {
        KvConcurrencyLimiter::new(
            Arc::new(InMemoryKvStore::new()),
            Arc::new(PlanLimits::new(max)),
            Duration::from_secs(300),
        )
    }

    fn unit(team: &str, priority: i64) -> ScrapeUnit {
        ScrapeUnit::new(format!("https://example.test/{priority}"), team.into(), priority, ScrapeOptions::default())
    }

    #[tokio::test]
    async fn admits_up_to_max_concurrency() {
        let limiter = make_limiter(2);
        assert!(limiter.admit(&unit("team-1", 1)).await.unwrap());
        assert!(limiter.admit(&unit("team-1", 2)).await.unwrap());
        assert!(!limiter.admit(&unit("team-1", 3)).await.unwrap());
    }

    #[tokio::test]
    async fn release_drains_overflow() {
        let limiter = make_limiter(1);
        let u1 = unit("team-1", 1);
        let id1 = u1.id;
        assert!(limiter.admit(&u1).await.unwrap());
        let u2 = unit("team-1", 2);
        assert!(!limiter.admit(&u2).await.unwrap());

        let admitted = limiter.release("team-1", id1).await.unwrap();
        assert_eq!(admitted.len(), 1);

        let stats = limiter.get_stats("team-1").await.unwrap();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.overflow_depth, 0);
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrency_across_many_submissions() {
        let limiter = make_limiter(2);
        for i in 0..5 {
            limiter.admit(&unit("team-1", i)).await.unwrap();
        }
        let stats = limiter.get_stats("team-1").await.unwrap();
        assert!(stats.active <= 2);
        assert_eq!(stats.overflow_depth, 3);
    }
}

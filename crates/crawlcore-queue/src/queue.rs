//! Job Queue (spec.md §4.2): priority queue of `ScrapeUnit`s with
//! reservation, retry, and completion lifecycle.
//!
//! Adapted from `riptide-workers/src/queue.rs`'s `JobQueue`: a sorted
//! set provides priority ordering, `SET NX` provides lease acquisition
//! on reservation, and each unit is stored as a JSON blob under its own
//! key so any worker in the fleet can reserve from any process.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crawlcore_types::error::{CoreError, Result};
use crawlcore_types::model::{ScrapeUnit, UnitState};
use crawlcore_types::ports::kv::KvStore;

use crate::retry::RetryPolicy;

const PENDING_KEY: &str = "queue:pending";
const SEQ_KEY: &str = "queue:seq";

fn unit_key(id: Uuid) -> String {
    format!("queue:unit:{id}")
}

fn lease_key(id: Uuid) -> String {
    format!("queue:lease:{id}")
}

fn result_key(id: Uuid) -> String {
    format!("queue:result:{id}")
}

/// A unit pulled off the queue by `reserve`, carrying the lease it was
/// reserved under.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub unit: ScrapeUnit,
    pub lease_ttl: Duration,
}

pub struct ScrapeQueue {
    kv: Arc<dyn KvStore>,
    retry_policy: RetryPolicy,
}

impl ScrapeQueue {
    pub fn new(kv: Arc<dyn KvStore>, retry_policy: RetryPolicy) -> Self {
        Self { kv, retry_policy }
    }

    /// Score encodes priority as the integer part (lower runs first)
    /// and a monotonic sequence number as the fractional part, giving
    /// FIFO ordering among equal priorities (spec.md §4.2).
    async fn score_for(&self, priority: i64) -> Result<f64> {
        let seq = self.kv.incr_by(SEQ_KEY, 1).await?;
        Ok(priority as f64 + (seq as f64 / 1e15))
    }

    /// Accepts a unit; idempotent by unit id (spec.md §4.2).
    #[instrument(skip(self, unit), fields(unit_id = %unit.id, priority = unit.priority))]
    pub async fn submit(&self, unit: ScrapeUnit) -> Result<()> {
        if self.kv.get(&unit_key(unit.id)).await?.is_some() {
            debug!("duplicate submission, ignoring");
            return Ok(());
        }

        let score = self.score_for(unit.priority).await?;
        let payload = serde_json::to_vec(&unit)?;
        self.kv.set(&unit_key(unit.id), &payload, None).await?;
        self.kv.zadd(PENDING_KEY, &unit.id.to_string(), score).await?;
        Ok(())
    }

    /// Atomically moves one unit from Queued to Reserved, returning it
    /// with a lease. Returns `None` if nothing is ready.
    #[instrument(skip(self))]
    pub async fn reserve(&self, worker_id: &str, lease_ttl: Duration) -> Result<Option<Reservation>> {
        let candidates = self.kv.zrange_by_score(PENDING_KEY, f64::MIN, f64::MAX).await?;

        for id_str in candidates {
            let Ok(id) = Uuid::parse_str(&id_str) else {
                continue;
            };

            let Some(raw) = self.kv.get(&unit_key(id)).await? else {
                self.kv.zrem(PENDING_KEY, &id_str).await?;
                continue;
            };
            let mut unit: ScrapeUnit = serde_json::from_slice(&raw)?;

            if unit.state != UnitState::Queued {
                self.kv.zrem(PENDING_KEY, &id_str).await?;
                continue;
            }

            let acquired = self
                .kv
                .set_nx(&lease_key(id), worker_id.as_bytes(), Some(lease_ttl))
                .await?;
            if !acquired {
                // Another worker won the race; try the next candidate.
                continue;
            }

            unit.state = UnitState::Reserved;
            self.kv.set(&unit_key(id), &serde_json::to_vec(&unit)?, None).await?;
            self.kv.zrem(PENDING_KEY, &id_str).await?;

            return Ok(Some(Reservation { unit, lease_ttl }));
        }

        Ok(None)
    }

    /// Terminal success transition.
    #[instrument(skip(self, result))]
    pub async fn complete(&self, id: Uuid, result: &serde_json::Value) -> Result<()> {
        let Some(raw) = self.kv.get(&unit_key(id)).await? else {
            return Err(CoreError::NotFound(format!("unit {id}")));
        };
        let mut unit: ScrapeUnit = serde_json::from_slice(&raw)?;
        unit.state = UnitState::Completed;
        self.kv.set(&unit_key(id), &serde_json::to_vec(&unit)?, None).await?;
        self.kv
            .set(&result_key(id), &serde_json::to_vec(result)?, None)
            .await?;
        self.kv.delete(&[lease_key(id)]).await?;
        Ok(())
    }

    /// Terminal or retriable failure transition (spec.md §4.2).
    ///
    /// Retriable failures re-queue with exponential backoff; the unit
    /// is re-added to `PENDING_KEY` immediately with the same score —
    /// a background sweep in the dispatcher is responsible for holding
    /// back units whose `next_retry_at` has not yet elapsed (see
    /// `crawlcore-crawl::dispatcher`).
    #[instrument(skip(self))]
    pub async fn fail(&self, id: Uuid, reason: &str, retriable: bool) -> Result<bool> {
        let Some(raw) = self.kv.get(&unit_key(id)).await? else {
            return Err(CoreError::NotFound(format!("unit {id}")));
        };
        let mut unit: ScrapeUnit = serde_json::from_slice(&raw)?;
        unit.attempt_count += 1;
        unit.last_error = Some(reason.to_string());

        self.kv.delete(&[lease_key(id)]).await?;

        if retriable && !self.retry_policy.exhausted(unit.attempt_count) {
            unit.state = UnitState::Queued;
            self.kv.set(&unit_key(id), &serde_json::to_vec(&unit)?, None).await?;
            let score = self.score_for(unit.priority).await?;
            self.kv.zadd(PENDING_KEY, &id.to_string(), score).await?;
            debug!(unit_id = %id, attempt = unit.attempt_count, "requeued for retry");
            Ok(true)
        } else {
            unit.state = UnitState::Failed;
            self.kv.set(&unit_key(id), &serde_json::to_vec(&unit)?, None).await?;
            warn!(unit_id = %id, reason, "unit failed, not retrying");
            Ok(false)
        }
    }

    /// Forcibly discards a unit regardless of state (spec.md §4.2),
    /// used for crawl cancellation short-circuiting.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let Some(raw) = self.kv.get(&unit_key(id)).await? else {
            return Ok(());
        };
        let mut unit: ScrapeUnit = serde_json::from_slice(&raw)?;
        unit.state = UnitState::Cancelled;
        self.kv.set(&unit_key(id), &serde_json::to_vec(&unit)?, None).await?;
        self.kv.zrem(PENDING_KEY, &id.to_string()).await?;
        self.kv.delete(&[lease_key(id)]).await?;
        Ok(())
    }

    pub async fn state(&self, id: Uuid) -> Result<Option<UnitState>> {
        match self.kv.get(&unit_key(id)).await? {
            Some(raw) => {
                let unit: ScrapeUnit = serde_json::from_slice(&raw)?;
                Ok(Some(unit.state))
            }
            None => Ok(None),
        }
    }

    /// Full unit record, including `last_error` (spec.md §4.10
    /// `GET /crawl/{id}/errors`).
    pub async fn get_unit(&self, id: Uuid) -> Result<Option<ScrapeUnit>> {
        match self.kv.get(&unit_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_result(&self, id: Uuid) -> Result<Option<serde_json::Value>> {
        match self.kv.get(&result_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn pending_len(&self) -> Result<u64> {
        self.kv.zcard(PENDING_KEY).await
    }
}

/// Priority escalation formula (spec.md §4.3): teams with a large
/// backlog get progressively worse (higher) priority numbers so they
/// do not monopolize workers.
pub fn escalate_priority(base: i64, backlog: u64, bucket: u64, plan_modifier: i64) -> i64 {
    let overflow = backlog.saturating_sub(bucket) as i64;
    base + overflow.max(0) * plan_modifier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlcore_kv::InMemoryKvStore;
    use crawlcore_types::model::ScrapeOptions;

    fn make_queue() -> ScrapeQueue {
        ScrapeQueue::new(Arc::new(InMemoryKvStore::new()), RetryPolicy::default())
    }

    #[tokio::test]
    async fn submit_then_reserve_round_trip() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let id = unit.id;
        queue.submit(unit).await.unwrap();

        let reservation = queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(reservation.unit.id, id);
        assert_eq!(queue.state(id).await.unwrap(), Some(UnitState::Reserved));
    }

    #[tokio::test]
    async fn duplicate_submission_is_noop() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let dup = unit.clone();
        queue.submit(unit).await.unwrap();
        queue.submit(dup).await.unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reservation_is_exclusive() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        queue.submit(unit).await.unwrap();

        let first = queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap();
        assert!(first.is_some());
        let second = queue.reserve("worker-2", Duration::from_secs(60)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn lower_priority_number_reserved_first() {
        let queue = make_queue();
        let low = ScrapeUnit::new("https://example.test/low".into(), "team-1".into(), 5, ScrapeOptions::default());
        let high = ScrapeUnit::new("https://example.test/high".into(), "team-1".into(), 1, ScrapeOptions::default());
        let high_id = high.id;
        queue.submit(low).await.unwrap();
        queue.submit(high).await.unwrap();

        let reservation = queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(reservation.unit.id, high_id);
    }

    #[tokio::test]
    async fn retriable_failure_requeues() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let id = unit.id;
        queue.submit(unit).await.unwrap();
        queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap();

        let requeued = queue.fail(id, "timeout", true).await.unwrap();
        assert!(requeued);
        assert_eq!(queue.state(id).await.unwrap(), Some(UnitState::Queued));
    }

    #[tokio::test]
    async fn non_retriable_failure_is_terminal() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let id = unit.id;
        queue.submit(unit).await.unwrap();
        queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap();

        let requeued = queue.fail(id, "blocked", false).await.unwrap();
        assert!(!requeued);
        assert_eq!(queue.state(id).await.unwrap(), Some(UnitState::Failed));
    }

    #[tokio::test]
    async fn get_unit_carries_last_error_after_failure() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let id = unit.id;
        queue.submit(unit).await.unwrap();
        queue.reserve("worker-1", Duration::from_secs(60)).await.unwrap();
        queue.fail(id, "upstream 404", false).await.unwrap();

        let stored = queue.get_unit(id).await.unwrap().unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("upstream 404"));
    }

    #[tokio::test]
    async fn remove_short_circuits_to_cancelled() {
        let queue = make_queue();
        let unit = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 10, ScrapeOptions::default());
        let id = unit.id;
        queue.submit(unit).await.unwrap();
        queue.remove(id).await.unwrap();
        assert_eq!(queue.state(id).await.unwrap(), Some(UnitState::Cancelled));
        assert_eq!(queue.pending_len().await.unwrap(), 0);
    }

    #[test]
    fn priority_escalation_formula() {
        assert_eq!(escalate_priority(10, 50, 20, 2), 70);
        assert_eq!(escalate_priority(10, 5, 20, 2), 10);
    }
}

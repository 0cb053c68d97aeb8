//! Scheduler / Dispatcher (spec.md §4.6): bridges the Concurrency
//! Limiter and the Job Queue.
//!
//! The teacher's `riptide-workers/src/scheduler.rs` `JobScheduler` is a
//! cron-based periodic-job runner and is not a semantic match for this
//! component — spec.md's dispatcher reacts to admission/completion/
//! lease-expiry events rather than wall-clock schedules. What carries
//! over is the *background-sweep-task idiom*: a `tokio::spawn` loop on
//! a fixed `tokio::time::interval`, with per-tick `tracing`
//! instrumentation, here driving `ConcurrencyLimiter::drain_overflow`
//! and `WebhookDispatcher::sweep_retries` instead of cron matching.

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crawlcore_types::error::Result;
use crawlcore_types::ports::concurrency::ConcurrencyLimiter;

use crate::webhook::WebhookDispatcher;
use crawlcore_queue::ScrapeQueue;

pub struct Dispatcher {
    limiter: Arc<dyn ConcurrencyLimiter>,
    queue: Arc<ScrapeQueue>,
    webhooks: Arc<WebhookDispatcher>,
    known_teams: DashSet<String>,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<dyn ConcurrencyLimiter>,
        queue: Arc<ScrapeQueue>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            limiter,
            queue,
            webhooks,
            known_teams: DashSet::new(),
        }
    }

    pub fn register_team(&self, team_id: &str) {
        self.known_teams.insert(team_id.to_string());
    }

    /// Submits `unit` through the Concurrency Limiter; if admitted,
    /// forwards it to the Job Queue immediately (spec.md §4.6:
    /// "dispatcher's only job is admit → submit").
    #[instrument(skip(self, unit))]
    pub async fn submit(&self, unit: crawlcore_types::model::ScrapeUnit) -> Result<()> {
        self.register_team(&unit.team_id);
        if self.limiter.admit(&unit).await? {
            self.queue.submit(unit).await?;
        }
        Ok(())
    }

    /// Triggered by a unit completion/failure/cancellation: releases
    /// the team's lease and forwards any units the release admitted
    /// from the overflow queue on to the Job Queue.
    #[instrument(skip(self))]
    pub async fn on_unit_terminal(&self, team_id: &str, unit_id: uuid::Uuid) -> Result<usize> {
        let admitted = self.limiter.release(team_id, unit_id).await?;
        let count = admitted.len();
        for unit in admitted {
            self.queue.submit(unit).await?;
        }
        Ok(count)
    }

    /// One sweep cycle: attempts to drain overflow for every team seen
    /// so far (covers lease-expiry events, which free capacity without
    /// an explicit completion callback) and flushes due webhook
    /// retries.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<()> {
        for team_id in self.known_teams.iter() {
            let admitted = self.limiter.drain_overflow(&team_id).await?;
            if !admitted.is_empty() {
                debug!(team_id = %*team_id, count = admitted.len(), "drained overflow on sweep");
            }
            for unit in admitted {
                self.queue.submit(unit).await?;
            }
        }
        self.webhooks.sweep_retries().await?;
        Ok(())
    }

    /// Spawns the background sweep loop. Mirrors the teacher's
    /// `JobScheduler` tick-loop shape (`tokio::spawn` + fixed
    /// `tokio::time::interval`), repurposed to drive admission sweeps
    /// instead of cron matching.
    pub fn spawn_sweep_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::warn!(error = %e, "dispatcher sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlcore_kv::InMemoryKvStore;
    use crawlcore_queue::{KvConcurrencyLimiter, PlanLimits, RetryPolicy};
    use crawlcore_types::model::{ScrapeOptions, ScrapeUnit};

    fn make_dispatcher(max: u32) -> Dispatcher {
        let kv: Arc<dyn crawlcore_types::ports::kv::KvStore> = Arc::new(InMemoryKvStore::new());
        let limiter = Arc::new(KvConcurrencyLimiter::new(
            kv.clone(),
            Arc::new(PlanLimits::new(max)),
            Duration::from_secs(300),
        ));
        let queue = Arc::new(ScrapeQueue::new(kv.clone(), RetryPolicy::default()));
        let webhooks = Arc::new(WebhookDispatcher::new(kv, RetryPolicy::default()));
        Dispatcher::new(limiter, queue, webhooks)
    }

    #[tokio::test]
    async fn submit_beyond_capacity_does_not_reach_queue() {
        let dispatcher = make_dispatcher(1);
        let u1 = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 1, ScrapeOptions::default());
        let u2 = ScrapeUnit::new("https://example.test/b".into(), "team-1".into(), 1, ScrapeOptions::default());
        let u2_id = u2.id;
        dispatcher.submit(u1).await.unwrap();
        dispatcher.submit(u2).await.unwrap();

        assert_eq!(dispatcher.queue.pending_len().await.unwrap(), 1);
        assert_eq!(dispatcher.queue.state(u2_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn terminal_release_admits_overflowed_unit() {
        let dispatcher = make_dispatcher(1);
        let u1 = ScrapeUnit::new("https://example.test/a".into(), "team-1".into(), 1, ScrapeOptions::default());
        let u1_id = u1.id;
        let u2 = ScrapeUnit::new("https://example.test/b".into(), "team-1".into(), 1, ScrapeOptions::default());
        let u2_id = u2.id;

        dispatcher.submit(u1).await.unwrap();
        dispatcher.submit(u2).await.unwrap();
        assert_eq!(dispatcher.queue.state(u2_id).await.unwrap(), None);

        dispatcher.on_unit_terminal("team-1", u1_id).await.unwrap();
        assert!(dispatcher.queue.state(u2_id).await.unwrap().is_some());
    }
}

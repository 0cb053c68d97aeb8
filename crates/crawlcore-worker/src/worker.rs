//! `Worker` / `WorkerPool` (spec.md §4.7): the seven-step reservation
//! loop and its pool management.
//!
//! Directly adapted from `riptide-workers/src/worker.rs`'s `Worker` /
//! `WorkerPool`: a `Semaphore`-bounded concurrency gate, atomic
//! counters plus a `parking_lot::RwLock` for richer stats fields, and
//! a separate heartbeat task — only `process_next_job`'s body changes,
//! since this system has exactly one unit type rather than a
//! dispatch-by-job-type processor registry.

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::webhook::WebhookDispatcher;
use crawlcore_crawl::Dispatcher;
use crawlcore_events::EventType;
use crawlcore_queue::ScrapeQueue;
use crawlcore_types::error::Result;
use crawlcore_types::model::{ScrapeUnit, UnitState};

use crate::processor::{ProcessOutcome, ScrapeProcessor};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub poll_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(2),
            poll_interval_secs: 5,
            job_timeout_secs: 600,
            heartbeat_interval_secs: 30,
            max_concurrent_jobs: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub units_processed: AtomicU64,
    pub units_failed: AtomicU64,
    pub last_heartbeat: parking_lot::RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    pub started_at: parking_lot::RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    pub current_unit: parking_lot::RwLock<Option<Uuid>>,
}

pub struct Worker {
    pub id: String,
    config: WorkerConfig,
    queue: Arc<ScrapeQueue>,
    dispatcher: Arc<Dispatcher>,
    processor: Arc<dyn ScrapeProcessor>,
    state_machine: Arc<CrawlStateMachine>,
    webhooks: Arc<WebhookDispatcher>,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    semaphore: Arc<Semaphore>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        config: WorkerConfig,
        queue: Arc<ScrapeQueue>,
        dispatcher: Arc<Dispatcher>,
        processor: Arc<dyn ScrapeProcessor>,
        state_machine: Arc<CrawlStateMachine>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            id,
            config,
            queue,
            dispatcher,
            processor,
            state_machine,
            webhooks,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(WorkerStats::default()),
            semaphore,
        }
    }

    pub async fn start(&self, shutdown: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(worker_id = %self.id, "worker already running");
            return;
        }
        info!(worker_id = %self.id, "starting worker");
        *self.stats.started_at.write() = Some(Utc::now());

        let heartbeat = self.spawn_heartbeat();
        let loop_task = self.run_loop(shutdown.clone());

        tokio::select! {
            _ = heartbeat => {}
            _ = loop_task => {}
            _ = shutdown.cancelled() => {}
        }
        self.running.store(false, Ordering::SeqCst);
        info!(worker_id = %self.id, "worker stopped");
    }

    pub fn stats_snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            worker_id: self.id.clone(),
            units_processed: self.stats.units_processed.load(Ordering::Relaxed),
            units_failed: self.stats.units_failed.load(Ordering::Relaxed),
            last_heartbeat: *self.stats.last_heartbeat.read(),
            current_unit: *self.stats.current_unit.read(),
        }
    }

    async fn run_loop(&self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.process_next(&shutdown).await {
                Ok(true) => {}
                Ok(false) => sleep(Duration::from_secs(self.config.poll_interval_secs)).await,
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "error in worker loop, continuing");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Steps 1-7 of spec.md §4.7, minus the dispatcher-side admission
    /// which happened before a unit ever reached the Job Queue.
    async fn process_next(&self, shutdown: &CancellationToken) -> Result<bool> {
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            crawlcore_types::error::CoreError::InternalLogic("semaphore closed".into())
        })?;

        // Step 1: reserve.
        let lease_ttl = Duration::from_secs(self.config.job_timeout_secs * 3);
        let Some(reservation) = self.queue.reserve(&self.id, lease_ttl).await? else {
            return Ok(false);
        };
        let unit = reservation.unit;
        *self.stats.current_unit.write() = Some(unit.id);

        debug!(worker_id = %self.id, unit_id = %unit.id, url = %unit.url, "processing unit");
        let start = Instant::now();
        let cancel = shutdown.child_token();

        let outcome = tokio::time::timeout(
            Duration::from_millis(unit.scrape_options.timeout_ms).max(Duration::from_secs(1)),
            self.processor.process(&unit, cancel),
        )
        .await
        .unwrap_or_else(|_| ProcessOutcome::Retriable("worker-side timeout".into()));

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.finalize(&unit, outcome).await?;
        debug!(worker_id = %self.id, unit_id = %unit.id, elapsed_ms, "unit finished");

        *self.stats.current_unit.write() = None;
        Ok(true)
    }

    async fn finalize(&self, unit: &ScrapeUnit, outcome: ProcessOutcome) -> Result<()> {
        match outcome {
            ProcessOutcome::Completed(result) => {
                self.queue.complete(unit.id, &result).await?;
                self.stats.units_processed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Retriable(reason) => {
                self.queue.fail(unit.id, &reason, true).await?;
                self.stats.units_failed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Terminal(reason) => {
                self.queue.fail(unit.id, &reason, false).await?;
                self.stats.units_failed.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Cancelled => {
                self.queue.remove(unit.id).await?;
            }
        }
        // Step 7: release the concurrency lease and let the dispatcher
        // admit whatever the release frees up.
        self.dispatcher.on_unit_terminal(&unit.team_id, unit.id).await?;

        if let Some(crawl_id) = unit.crawl_id {
            self.maybe_complete_crawl(crawl_id, unit.webhook.clone()).await?;
        }
        Ok(())
    }

    /// Runs the Completion Evaluator (spec.md §4.5: `kickoff_finished
    /// && all units terminal -> Completed`) after every unit belonging
    /// to a crawl reaches a terminal state, and emits the
    /// `crawl.completed` webhook (spec.md §4.9) when it fires.
    async fn maybe_complete_crawl(&self, crawl_id: Uuid, webhook: Option<String>) -> Result<()> {
        let job_ids = self.state_machine.job_ids(crawl_id).await?;
        let unit_states = collect_unit_states(&self.queue, &job_ids).await?;
        let completed = self.state_machine.evaluate_completion(crawl_id, &unit_states).await?;
        if !completed {
            return Ok(());
        }

        info!(crawl_id = %crawl_id, "crawl completed");
        if let Some(url) = webhook {
            let counters = self.state_machine.counters(crawl_id).await?;
            self.webhooks
                .emit(
                    &url,
                    EventType::CrawlCompleted,
                    crawl_id,
                    serde_json::json!({
                        "success": true,
                        "completed": counters.done_count,
                        "creditsUsed": counters.credit_count,
                    }),
                )
                .await;
        }
        Ok(())
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let id = self.id.clone();
        let running = self.running.clone();
        let stats = self.stats.clone();
        let interval = Duration::from_secs(self.config.heartbeat_interval_secs);
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                *stats.last_heartbeat.write() = Some(Utc::now());
                debug!(worker_id = %id, "heartbeat");
                sleep(interval).await;
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStatsSnapshot {
    pub worker_id: String,
    pub units_processed: u64,
    pub units_failed: u64,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub current_unit: Option<Uuid>,
}

pub struct WorkerPool {
    config: WorkerConfig,
    queue: Arc<ScrapeQueue>,
    dispatcher: Arc<Dispatcher>,
    processor: Arc<dyn ScrapeProcessor>,
    state_machine: Arc<CrawlStateMachine>,
    webhooks: Arc<WebhookDispatcher>,
    workers: Arc<DashMap<String, Arc<Worker>>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        queue: Arc<ScrapeQueue>,
        dispatcher: Arc<Dispatcher>,
        processor: Arc<dyn ScrapeProcessor>,
        state_machine: Arc<CrawlStateMachine>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            config,
            queue,
            dispatcher,
            processor,
            state_machine,
            webhooks,
            workers: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn run(&self) {
        info!(worker_count = self.config.worker_count, "starting worker pool");
        let mut handles = Vec::new();
        for i in 0..self.config.worker_count {
            let worker_id = format!("worker-{i}");
            let worker = Arc::new(Worker::new(
                worker_id.clone(),
                self.config.clone(),
                self.queue.clone(),
                self.dispatcher.clone(),
                self.processor.clone(),
                self.state_machine.clone(),
                self.webhooks.clone(),
            ));
            self.workers.insert(worker_id, worker.clone());

            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.start(shutdown).await;
            }));
        }
        join_all(handles).await;
        info!("worker pool stopped");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pool_stats(&self) -> Vec<WorkerStatsSnapshot> {
        self.workers.iter().map(|w| w.value().stats_snapshot()).collect()
    }
}

/// Tracks a crawl's unit states so `evaluate_completion` has something
/// to check against (spec.md §4.5). A thin convenience wrapper — the
/// authoritative per-unit state always lives in the Job Queue.
pub async fn collect_unit_states(queue: &ScrapeQueue, job_ids: &[Uuid]) -> Result<Vec<UnitState>> {
    let mut states = Vec::with_capacity(job_ids.len());
    for id in job_ids {
        if let Some(state) = queue.state(*id).await? {
            states.push(state);
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_default_has_sane_values() {
        let config = WorkerConfig::default();
        assert!(config.worker_count >= 2);
        assert_eq!(config.poll_interval_secs, 5);
    }
}

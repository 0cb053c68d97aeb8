//! Crawl State Machine (spec.md §4.5).
//!
//! Grounded on `riptide-workers/src/state.rs`'s `StateTransitionGuard`:
//! a `HashMap<(From, To), reason>` lookup table drives the allowed
//! transitions, self-transitions are always allowed, and a record
//! already in a terminal state refuses any further transition
//! (compare-and-set, spec.md §5).

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crawlcore_types::error::{CoreError, Result};
use crawlcore_types::model::{CrawlRecord, CrawlState, CrawlURLSet};
use crawlcore_types::ports::kv::KvStore;

fn crawl_key(id: Uuid) -> String {
    format!("crawl:{id}")
}

fn visited_key(id: Uuid) -> String {
    format!("crawl:{id}:visited")
}

fn jobs_key(id: Uuid) -> String {
    format!("crawl:{id}:jobs")
}

fn counter_key(id: Uuid, name: &str) -> String {
    format!("crawl:{id}:counters:{name}")
}

fn depth_key(id: Uuid, url: &str) -> String {
    format!("crawl:{id}:depth:{url}")
}

fn cancel_channel(id: Uuid) -> String {
    format!("crawl:{id}:cancel")
}

fn team_crawls_key(team_id: &str) -> String {
    format!("team:{team_id}:crawls")
}

/// Guards a single version's transition attempt: a `SET NX` claim here
/// wins the race for exactly one caller reading `expected_version`, the
/// same idiom `queue.rs`'s `reserve` uses for lease acquisition.
fn transition_token_key(id: Uuid, expected_version: u64) -> String {
    format!("crawl:{id}:transition:{expected_version}")
}

/// Whether a crawl may move from `from` to `to`. Self-transitions are
/// always allowed (idempotent re-application); any transition out of a
/// terminal state, other than to itself, is refused.
pub struct StateTransitionGuard {
    allowed: HashMap<(CrawlState, CrawlState), &'static str>,
}

impl Default for StateTransitionGuard {
    fn default() -> Self {
        let mut allowed = HashMap::new();
        allowed.insert((CrawlState::Scraping, CrawlState::Completed), "kickoff finished, all units terminal");
        allowed.insert((CrawlState::Scraping, CrawlState::Failed), "kickoff-level failure");
        allowed.insert((CrawlState::Scraping, CrawlState::Cancelled), "client cancellation");
        Self { allowed }
    }
}

impl StateTransitionGuard {
    pub fn check(&self, from: CrawlState, to: CrawlState) -> std::result::Result<(), String> {
        if from == to {
            return Ok(());
        }
        if from.is_terminal() {
            return Err(format!("{from:?} is terminal, cannot move to {to:?}"));
        }
        if self.allowed.contains_key(&(from, to)) {
            Ok(())
        } else {
            Err(format!("no transition defined {from:?} -> {to:?}"))
        }
    }
}

pub enum LockResult {
    NewlyLocked,
    AlreadyLocked,
    LimitExceeded,
}

pub struct CrawlStateMachine {
    kv: Arc<dyn KvStore>,
    guard: StateTransitionGuard,
}

impl CrawlStateMachine {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            guard: StateTransitionGuard::default(),
        }
    }

    pub async fn create(&self, record: &CrawlRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        let is_new = self.kv.get(&crawl_key(record.id)).await?.is_none();
        self.kv.set(&crawl_key(record.id), &payload, None).await?;
        if is_new {
            self.kv
                .list_push_back(&team_crawls_key(&record.team_id), &record.id.to_string())
                .await?;
        }
        Ok(())
    }

    /// Crawls still in `Scraping` for a team, most-recently-created last
    /// (spec.md §4.10 `GET /crawl/ongoing`).
    pub async fn ongoing_for_team(&self, team_id: &str) -> Result<Vec<CrawlRecord>> {
        let ids = self.kv.list_range(&team_crawls_key(team_id), 0, -1).await?;
        let mut records = Vec::new();
        for id_str in ids {
            let Ok(id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            if let Some(record) = self.get(id).await? {
                if record.state == CrawlState::Scraping {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CrawlRecord>> {
        match self.kv.get(&crawl_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Atomic add to the crawl's visited set — the only operation that
    /// authorizes a URL to be scraped for that crawl (spec.md Glossary
    /// "Lock-URL"). Enforces `|locked_urls| <= limit` by adding
    /// optimistically and compensating (removing) on overshoot, per
    /// spec.md §4.1's "compensating sequence" design note.
    pub async fn lock_url(&self, id: Uuid, url: &str, limit: u64) -> Result<LockResult> {
        let newly_added = self.kv.set_add(&visited_key(id), url).await?;
        if !newly_added {
            return Ok(LockResult::AlreadyLocked);
        }

        let cardinality = self.kv.set_card(&visited_key(id)).await?;
        if cardinality > limit {
            self.kv.set_remove(&visited_key(id), url).await?;
            return Ok(LockResult::LimitExceeded);
        }

        Ok(LockResult::NewlyLocked)
    }

    pub async fn locked_count(&self, id: Uuid) -> Result<u64> {
        self.kv.set_card(&visited_key(id)).await
    }

    pub async fn record_discovery_depth(&self, id: Uuid, url: &str, depth: u32) -> Result<()> {
        self.kv.set(&depth_key(id, url), depth.to_string().as_bytes(), None).await
    }

    pub async fn discovery_depth_of(&self, id: Uuid, url: &str) -> Result<u32> {
        Ok(self
            .kv
            .get(&depth_key(id, url))
            .await?
            .map(|raw| String::from_utf8_lossy(&raw).parse().unwrap_or(0))
            .unwrap_or(0))
    }

    pub async fn push_job_id(&self, id: Uuid, unit_id: Uuid) -> Result<()> {
        self.kv.list_push_back(&jobs_key(id), &unit_id.to_string()).await?;
        Ok(())
    }

    pub async fn job_ids(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let raw = self.kv.list_range(&jobs_key(id), 0, -1).await?;
        Ok(raw.into_iter().filter_map(|s| Uuid::parse_str(&s).ok()).collect())
    }

    pub async fn increment_done(&self, id: Uuid) -> Result<i64> {
        self.kv.incr_by(&counter_key(id, "done"), 1).await
    }

    pub async fn increment_error(&self, id: Uuid) -> Result<i64> {
        self.kv.incr_by(&counter_key(id, "error"), 1).await
    }

    pub async fn increment_credits(&self, id: Uuid, n: i64) -> Result<i64> {
        self.kv.incr_by(&counter_key(id, "credit"), n).await
    }

    pub async fn counters(&self, id: Uuid) -> Result<CrawlURLSet> {
        let mut set = CrawlURLSet::default();
        set.locked_urls = self.kv.set_members(&visited_key(id)).await?;
        set.job_ids = self.job_ids(id).await?;
        set.done_count = self.kv.get(&counter_key(id, "done")).await?
            .map(|raw| String::from_utf8_lossy(&raw).parse().unwrap_or(0))
            .unwrap_or(0);
        set.error_count = self.kv.get(&counter_key(id, "error")).await?
            .map(|raw| String::from_utf8_lossy(&raw).parse().unwrap_or(0))
            .unwrap_or(0);
        set.credit_count = self.kv.get(&counter_key(id, "credit")).await?
            .map(|raw| String::from_utf8_lossy(&raw).parse().unwrap_or(0))
            .unwrap_or(0);
        Ok(set)
    }

    /// Compare-and-set transition. Reads the current record, validates
    /// the transition against the guard, and claims a `SET NX` token
    /// for this specific `expected_version` before writing — two
    /// callers racing off the same read can't both think they won, the
    /// way a double-read-then-write would let happen (spec.md §5's
    /// single-writer-wins contract).
    pub async fn try_transition(&self, id: Uuid, to: CrawlState) -> Result<bool> {
        let Some(mut record) = self.get(id).await? else {
            return Err(CoreError::NotFound(format!("crawl {id}")));
        };

        if let Err(reason) = self.guard.check(record.state, to) {
            tracing::debug!(crawl_id = %id, reason, "transition refused");
            return Ok(false);
        }
        if record.state == to {
            return Ok(true);
        }

        let expected_version = record.version;
        let claimed = self
            .kv
            .set_nx(
                &transition_token_key(id, expected_version),
                format!("{to:?}").as_bytes(),
                Some(Duration::from_secs(30)),
            )
            .await?;
        if !claimed {
            return Ok(false);
        }

        record.state = to;
        record.version += 1;
        if to.is_terminal() {
            record.finished_at = Some(Utc::now());
        }

        self.create(&record).await?;
        Ok(true)
    }

    /// Evaluates whether a crawl should complete: `kickoff_finished &&
    /// all units terminal` (spec.md §4.5).
    pub async fn evaluate_completion(
        &self,
        id: Uuid,
        unit_states: &[crawlcore_types::model::UnitState],
    ) -> Result<bool> {
        let Some(record) = self.get(id).await? else {
            return Ok(false);
        };
        if record.state.is_terminal() {
            return Ok(false);
        }
        if !record.kickoff_finished {
            return Ok(false);
        }
        let all_terminal = unit_states.iter().all(|s| s.is_terminal());
        if all_terminal {
            self.try_transition(id, CrawlState::Completed).await
        } else {
            Ok(false)
        }
    }

    /// Publishes a cancellation notice on the crawl's cancel channel so
    /// any worker holding one of its units observes it promptly
    /// (spec.md §5).
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let transitioned = self.try_transition(id, CrawlState::Cancelled).await?;
        if transitioned {
            self.kv.publish(&cancel_channel(id), "cancelled").await?;
        }
        Ok(transitioned)
    }

    pub fn cancel_channel_name(&self, id: Uuid) -> String {
        cancel_channel(id)
    }
}

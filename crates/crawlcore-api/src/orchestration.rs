//! Create-crawl kickoff (spec.md §4.5):
//! "API writes CrawlRecord; calls `lock_url(id, seed)` which atomically
//! adds seed to `locked_urls`; submits seed as ScrapeUnit at seed
//! priority; fetches robots.txt (non-fatal); fetches sitemap
//! (non-fatal) — if sitemap yields URLs, each is `lock_url`-ed and
//! submitted in batches."

use std::sync::Arc;
use uuid::Uuid;

use crawlcore_crawl::state_machine::LockResult;
use crawlcore_events::EventType;
use crawlcore_policy::scope::{matches_crawl_scope, ScopeDecision};
use crawlcore_policy::normalize;
use crawlcore_queue::escalate_priority;
use crawlcore_types::model::{CrawlRecord, ScrapeUnit};

use crate::errors::ApiResult;
use crate::state::AppState;

const BASE_PRIORITY: i64 = 10;
const BACKLOG_BUCKET: u64 = 500;
const PLAN_MODIFIER: i64 = 1;
const USER_AGENT: &str = "crawlcore";

async fn next_priority(state: &AppState) -> ApiResult<i64> {
    let backlog = state.queue.pending_len().await?;
    Ok(escalate_priority(BASE_PRIORITY, backlog, BACKLOG_BUCKET, PLAN_MODIFIER))
}

/// Best-effort robots.txt fetch at the crawl's origin. Any failure —
/// network error, non-2xx status — yields `None` rather than failing
/// the kickoff (spec.md §4.5 "non-fatal").
async fn fetch_robots_txt(state: &AppState, origin_url: &str) -> Option<String> {
    let parsed = url::Url::parse(origin_url).ok()?;
    let candidate = format!("{}/robots.txt", parsed.origin().ascii_serialization());
    let response = state.robots_client.get(&candidate).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

/// Runs the full kickoff sequence against an already-persisted
/// `CrawlRecord` and returns once the seed unit and any in-scope
/// sitemap URLs have been submitted and `kickoff_finished` is set.
pub async fn kickoff_crawl(
    state: &Arc<AppState>,
    mut record: CrawlRecord,
    webhook: Option<String>,
) -> ApiResult<Uuid> {
    let crawl_id = record.id;
    state.state_machine.create(&record).await?;

    if let Some(url) = &webhook {
        state
            .webhooks
            .emit(
                url,
                EventType::CrawlStarted,
                crawl_id,
                serde_json::json!({ "success": true }),
            )
            .await;
    }

    let seed_lock = state
        .state_machine
        .lock_url(crawl_id, &record.origin_url, record.options.limit)
        .await?;
    if matches!(seed_lock, LockResult::NewlyLocked) {
        state
            .state_machine
            .record_discovery_depth(crawl_id, &record.origin_url, 0)
            .await?;
        let priority = next_priority(state).await?;
        let seed_unit = build_unit(&record, &record.origin_url, priority, webhook.clone());
        state.state_machine.push_job_id(crawl_id, seed_unit.id).await?;
        state.dispatcher.submit(seed_unit).await?;
    }

    if !record.options.ignore_robots_txt {
        record.robots_txt = fetch_robots_txt(state, &record.origin_url).await;
        state.state_machine.create(&record).await?;
    }

    if !record.options.ignore_sitemap {
        let sitemap_urls = state.sitemap.sitemap_fetch(&record.origin_url).await;
        submit_sitemap_urls(state, &record, webhook, sitemap_urls).await?;
    }

    record.kickoff_finished = true;
    state.state_machine.create(&record).await?;

    Ok(crawl_id)
}

/// Runs each sitemap URL through the same policy pipeline link
/// discovery uses (normalize → blocklist → scope → lock) before
/// submitting it as a depth-1 unit (spec.md §4.5).
async fn submit_sitemap_urls(
    state: &Arc<AppState>,
    record: &CrawlRecord,
    webhook: Option<String>,
    urls: Vec<String>,
) -> ApiResult<()> {
    for raw_url in urls {
        let locked = state.state_machine.locked_count(record.id).await?;
        if locked >= record.options.limit {
            break;
        }

        let Some(normalized) = normalize(
            &raw_url,
            record.options.ignore_query_parameters || record.options.deduplicate_similar_urls,
        ) else {
            continue;
        };
        if state.blocklist.is_blocked(&normalized) {
            continue;
        }
        let decision = matches_crawl_scope(&normalized, &record.origin_url, &record.options, 1);
        if decision != ScopeDecision::Allow {
            continue;
        }

        let lock = state
            .state_machine
            .lock_url(record.id, &normalized, record.options.limit)
            .await?;
        if !matches!(lock, LockResult::NewlyLocked) {
            continue;
        }

        state
            .state_machine
            .record_discovery_depth(record.id, &normalized, 1)
            .await?;
        let priority = next_priority(state).await?;
        let unit = build_unit(record, &normalized, priority, webhook.clone());
        state.state_machine.push_job_id(record.id, unit.id).await?;
        state.dispatcher.submit(unit).await?;
    }
    Ok(())
}

fn build_unit(record: &CrawlRecord, url: &str, priority: i64, webhook: Option<String>) -> ScrapeUnit {
    let mut unit = ScrapeUnit::new(url.to_string(), record.team_id.clone(), priority, record.scrape_options.clone())
        .for_crawl(record.id);
    unit.internal_options.zero_data_retention = record.zero_data_retention;
    unit.webhook = webhook;
    unit
}

pub fn user_agent() -> &'static str {
    USER_AGENT
}

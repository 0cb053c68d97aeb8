//! `ScrapeProcessor` (spec.md §4.7): the single-unit processing step a
//! `Worker` invokes once it holds a reservation.
//!
//! Grounded on the teacher's `JobProcessor` trait
//! (`riptide-workers/src/worker.rs`) — same shape (one async method,
//! a name for logging) but specialized to the fixed seven-step
//! lifecycle this system requires rather than a dispatch-by-job-type
//! design, since there is exactly one kind of unit here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::webhook::WebhookDispatcher;
use crawlcore_events::EventType;
use crawlcore_policy::scope::{matches_crawl_scope, ScopeDecision};
use crawlcore_policy::{blocklist::Blocklist, normalize};
use crawlcore_queue::ScrapeQueue;
use crawlcore_types::error::Result;
use crawlcore_types::model::{CrawlOptions, CrawlState, ScrapeUnit};
use crawlcore_types::ports::external::{FetchError, Fetcher, FetchedDocument};

/// Outcome of processing one unit, used by the caller (`Worker`) to
/// decide the Job Queue transition.
pub enum ProcessOutcome {
    Completed(serde_json::Value),
    Retriable(String),
    Terminal(String),
    Cancelled,
}

#[async_trait]
pub trait ScrapeProcessor: Send + Sync {
    async fn process(&self, unit: &ScrapeUnit, cancel: tokio_util::sync::CancellationToken) -> ProcessOutcome;

    fn name(&self) -> &'static str {
        "ScrapeProcessor"
    }
}

/// Default processor implementing spec.md §4.7 steps 2-6: re-check
/// crawl cancellation, invoke the Fetcher, run discovered links
/// through §4.5, persist the result, and emit the page-level webhook.
/// (Steps 1 and 7 — reserve/release — are the caller's responsibility;
/// see `crate::worker::Worker`.)
pub struct CrawlAwareProcessor {
    fetcher: Arc<dyn Fetcher>,
    state_machine: Arc<CrawlStateMachine>,
    queue: Arc<ScrapeQueue>,
    webhooks: Arc<WebhookDispatcher>,
    blocklist: Arc<Blocklist>,
}

impl CrawlAwareProcessor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        state_machine: Arc<CrawlStateMachine>,
        queue: Arc<ScrapeQueue>,
        webhooks: Arc<WebhookDispatcher>,
        blocklist: Arc<Blocklist>,
    ) -> Self {
        Self {
            fetcher,
            state_machine,
            queue,
            webhooks,
            blocklist,
        }
    }

    /// Feeds a fetched document's discovered links back through
    /// URL Policy + Lock-URL (spec.md §4.5 "Page completion").
    async fn discover_links(&self, unit: &ScrapeUnit, doc: &FetchedDocument, options: &CrawlOptions) -> Result<u64> {
        let Some(crawl_id) = unit.crawl_id else {
            return Ok(0);
        };
        let Some(record) = self.state_machine.get(crawl_id).await? else {
            return Ok(0);
        };

        let mut submitted = 0u64;
        let current_depth = self.state_machine.discovery_depth_of(crawl_id, &unit.url).await?;
        let locked = self.state_machine.locked_count(crawl_id).await?;
        if locked >= options.limit {
            return Ok(0);
        }

        for link in &doc.links {
            if locked + submitted >= options.limit {
                break;
            }
            let Some(normalized) = normalize(link, options.ignore_query_parameters || options.deduplicate_similar_urls)
            else {
                continue;
            };
            if self.blocklist.is_blocked(&normalized) {
                continue;
            }
            let decision = matches_crawl_scope(&normalized, &record.origin_url, options, current_depth + 1);
            if decision != ScopeDecision::Allow {
                continue;
            }

            let lock = self
                .state_machine
                .lock_url(crawl_id, &normalized, options.limit)
                .await?;
            if !matches!(lock, crawlcore_crawl::state_machine::LockResult::NewlyLocked) {
                continue;
            }

            self.state_machine
                .record_discovery_depth(crawl_id, &normalized, current_depth + 1)
                .await?;

            let child = ScrapeUnit::new(normalized, unit.team_id.clone(), unit.priority, unit.scrape_options.clone())
                .for_crawl(crawl_id);
            self.state_machine.push_job_id(crawl_id, child.id).await?;
            self.queue.submit(child).await?;
            submitted += 1;
        }

        Ok(submitted)
    }
}

#[async_trait]
impl ScrapeProcessor for CrawlAwareProcessor {
    async fn process(&self, unit: &ScrapeUnit, cancel: tokio_util::sync::CancellationToken) -> ProcessOutcome {
        // Step 2: re-check crawl state before doing any I/O.
        if let Some(crawl_id) = unit.crawl_id {
            match self.state_machine.get(crawl_id).await {
                Ok(Some(record)) if record.state == CrawlState::Cancelled => {
                    debug!(unit_id = %unit.id, crawl_id = %crawl_id, "crawl cancelled, short-circuiting unit");
                    return ProcessOutcome::Cancelled;
                }
                Ok(None) => {
                    return ProcessOutcome::Terminal("crawl record missing".into());
                }
                Err(e) => {
                    return ProcessOutcome::Retriable(e.to_string());
                }
                _ => {}
            }
        }

        // Step 3: invoke the Fetcher.
        let fetch_result = self.fetcher.fetch(&unit.url, &unit.scrape_options, cancel).await;
        let doc = match fetch_result {
            Ok(doc) => doc,
            Err(FetchError::Timeout) => return ProcessOutcome::Retriable("fetch timed out".into()),
            Err(FetchError::NetworkError(msg)) => return ProcessOutcome::Retriable(format!("network error: {msg}")),
            Err(FetchError::BadStatus(code)) if (500..600).contains(&code) => {
                return ProcessOutcome::Retriable(format!("upstream {code}"));
            }
            Err(FetchError::BadStatus(code)) => return ProcessOutcome::Terminal(format!("upstream {code}")),
            Err(FetchError::InsufficientTimeForPdf) => {
                return ProcessOutcome::Terminal("Insufficient time to process PDF".into());
            }
            Err(FetchError::BlockedByProvider) => return ProcessOutcome::Terminal("blocked by provider".into()),
        };

        // Step 4: discover links (crawl units only).
        if let Some(crawl_id) = unit.crawl_id {
            if let Ok(Some(record)) = self.state_machine.get(crawl_id).await {
                if let Err(e) = self.discover_links(unit, &doc, &record.options).await {
                    warn!(unit_id = %unit.id, error = %e, "link discovery failed, continuing with page result");
                }
            }
        }

        // Step 5: persist result.
        let result = serde_json::json!({
            "url": unit.url,
            "status": doc.status,
            "markdown": doc.markdown,
            "html": doc.html,
            "links": doc.links,
            "metadata": doc.metadata,
        });

        // Step 6: emit page-level webhook.
        if let Some(webhook_url) = &unit.webhook {
            let event_type = if unit.crawl_id.is_some() {
                EventType::CrawlPage
            } else {
                EventType::BatchScrapePage
            };
            self.webhooks.emit(webhook_url, event_type, unit.id, result.clone()).await;
        }

        if let Some(crawl_id) = unit.crawl_id {
            let _ = self.state_machine.increment_done(crawl_id).await;
        }

        info!(unit_id = %unit.id, url = %unit.url, "unit processed");
        ProcessOutcome::Completed(result)
    }

    fn name(&self) -> &'static str {
        "CrawlAwareProcessor"
    }
}

/// At-most-once-at-double-timeout retry for stand-alone single-URL
/// submissions (spec.md §4.7 "isSingleUrl" contract) — wraps a
/// processor and, on a retriable outcome for a non-crawl unit, retries
/// exactly once with the timeout doubled.
pub struct SingleUrlRetryProcessor<P> {
    inner: P,
}

impl<P: ScrapeProcessor> SingleUrlRetryProcessor<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: ScrapeProcessor> ScrapeProcessor for SingleUrlRetryProcessor<P> {
    async fn process(&self, unit: &ScrapeUnit, cancel: tokio_util::sync::CancellationToken) -> ProcessOutcome {
        let outcome = self.inner.process(unit, cancel.clone()).await;
        if unit.crawl_id.is_some() {
            return outcome;
        }
        match outcome {
            ProcessOutcome::Retriable(_) => {
                let mut doubled = unit.clone();
                doubled.scrape_options.timeout_ms *= 2;
                debug!(unit_id = %unit.id, "retrying single-url unit once at double timeout");
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.inner.process(&doubled, cancel).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlcore_kv::InMemoryKvStore;
    use crawlcore_policy::blocklist::Blocklist;
    use crawlcore_types::model::{CrawlOptions, CrawlRecord, ScrapeOptions};
    use crawlcore_types::ports::external::FetchedDocument;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubFetcher {
        links: Vec<String>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            url: &str,
            _options: &ScrapeOptions,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> std::result::Result<FetchedDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("source_url".to_string(), serde_json::json!(url));
            Ok(FetchedDocument {
                status: 200,
                headers: Default::default(),
                html: Some("<html></html>".into()),
                markdown: Some("# page".into()),
                raw_html: None,
                links: self.links.clone(),
                screenshot: None,
                actions_output: Vec::new(),
                pdf_text: None,
                metadata,
            })
        }
    }

    fn setup() -> (CrawlAwareProcessor, Arc<CrawlStateMachine>, Arc<ScrapeQueue>) {
        let kv: Arc<dyn crawlcore_types::ports::kv::KvStore> = Arc::new(InMemoryKvStore::new());
        let sm = Arc::new(CrawlStateMachine::new(kv.clone()));
        let queue = Arc::new(ScrapeQueue::new(kv.clone(), crawlcore_queue::RetryPolicy::default()));
        let webhooks = Arc::new(WebhookDispatcher::new(kv, crawlcore_queue::RetryPolicy::default()));
        let blocklist = Arc::new(Blocklist::new(vec![], vec![]));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher {
            links: vec!["https://example.test/a".into(), "https://example.test/b".into()],
            calls: AtomicU32::new(0),
        });
        let processor = CrawlAwareProcessor::new(fetcher, sm.clone(), queue.clone(), webhooks, blocklist);
        (processor, sm, queue)
    }

    #[tokio::test]
    async fn depth_zero_crawl_discovers_nothing() {
        let (processor, sm, _queue) = setup();
        let mut options = CrawlOptions::default();
        options.max_depth = 0;
        options.limit = 10;
        let record = CrawlRecord::new("https://example.test/".into(), "team-1".into(), options, ScrapeOptions::default());
        sm.create(&record).await.unwrap();
        sm.lock_url(record.id, &record.origin_url, 10).await.unwrap();

        let unit = ScrapeUnit::new(record.origin_url.clone(), "team-1".into(), 1, ScrapeOptions::default()).for_crawl(record.id);
        let outcome = processor.process(&unit, tokio_util::sync::CancellationToken::new()).await;
        assert!(matches!(outcome, ProcessOutcome::Completed(_)));
        assert_eq!(sm.locked_count(record.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_crawl_short_circuits_unit() {
        let (processor, sm, _queue) = setup();
        let record = CrawlRecord::new("https://example.test/".into(), "team-1".into(), CrawlOptions::default(), ScrapeOptions::default());
        sm.create(&record).await.unwrap();
        sm.cancel(record.id).await.unwrap();

        let unit = ScrapeUnit::new(record.origin_url.clone(), "team-1".into(), 1, ScrapeOptions::default()).for_crawl(record.id);
        let outcome = processor.process(&unit, tokio_util::sync::CancellationToken::new()).await;
        assert!(matches!(outcome, ProcessOutcome::Cancelled));
    }
}

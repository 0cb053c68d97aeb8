//! Shared application state (spec.md §9 "shared cross-process state").
//!
//! Grounded on `riptide-api/src/state.rs`'s `AppState`: one struct
//! bundling every shared component behind `Arc`, built once in
//! `main.rs` and handed to every handler via axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::{Dispatcher, KvIdempotencyStore, WebhookDispatcher};
use crawlcore_policy::{Blocklist, SitemapFetcher};
use crawlcore_queue::ScrapeQueue;
use crawlcore_types::ports::external::{Auth, Billing, Fetcher, SearchProvider};
use crawlcore_types::ports::kv::KvStore;

pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub state_machine: Arc<CrawlStateMachine>,
    pub queue: Arc<ScrapeQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub idempotency: Arc<KvIdempotencyStore>,
    pub blocklist: Arc<Blocklist>,
    pub sitemap: Arc<SitemapFetcher>,
    pub robots_client: reqwest::Client,
    pub auth: Arc<dyn Auth>,
    pub billing: Arc<dyn Billing>,
    pub fetcher: Arc<dyn Fetcher>,
    pub search: Arc<dyn SearchProvider>,
    pub user_agent: String,
    pub idempotency_ttl: Duration,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kv: Arc<dyn KvStore>,
        state_machine: Arc<CrawlStateMachine>,
        queue: Arc<ScrapeQueue>,
        dispatcher: Arc<Dispatcher>,
        webhooks: Arc<WebhookDispatcher>,
        idempotency: Arc<KvIdempotencyStore>,
        blocklist: Arc<Blocklist>,
        sitemap: Arc<SitemapFetcher>,
        auth: Arc<dyn Auth>,
        billing: Arc<dyn Billing>,
        fetcher: Arc<dyn Fetcher>,
        search: Arc<dyn SearchProvider>,
        user_agent: String,
    ) -> Self {
        Self {
            kv,
            state_machine,
            queue,
            dispatcher,
            webhooks,
            idempotency,
            blocklist,
            sitemap,
            robots_client: crawlcore_utils::http::HttpClientFactory::create(
                &crawlcore_utils::http::HttpConfig::with_user_agent(user_agent.clone())
                    .with_timeout(Duration::from_secs(10)),
            ),
            auth,
            billing,
            fetcher,
            search,
            user_agent,
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

//! Domain model: `CrawlRecord`, `CrawlURLSet`, `ScrapeUnit`,
//! `IdempotencyKey`, `ConcurrencyEntry` (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Terminal/non-terminal states of a crawl.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrawlState {
    Scraping,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlState {
    /// `Failed` and `Cancelled` are terminal; so is `Completed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CrawlState::Completed | CrawlState::Failed | CrawlState::Cancelled
        )
    }
}

/// Validated crawler options (spec.md §3 `CrawlRecord.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub limit: u64,
    pub max_depth: u32,
    pub max_discovery_depth: u32,
    pub allow_backward_links: bool,
    pub allow_external_links: bool,
    pub allow_subdomains: bool,
    pub ignore_robots_txt: bool,
    pub ignore_sitemap: bool,
    pub deduplicate_similar_urls: bool,
    pub ignore_query_parameters: bool,
    pub regex_on_full_url: bool,
    pub delay_ms: u64,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            limit: 10_000,
            max_depth: 10,
            max_discovery_depth: 10,
            allow_backward_links: false,
            allow_external_links: false,
            allow_subdomains: false,
            ignore_robots_txt: false,
            ignore_sitemap: false,
            deduplicate_similar_urls: false,
            ignore_query_parameters: false,
            regex_on_full_url: false,
            delay_ms: 0,
        }
    }
}

/// Per-page extraction options (spec.md §3 `CrawlRecord.scrape_options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOptions {
    pub formats: Vec<Format>,
    pub wait_for_ms: u64,
    pub timeout_ms: u64,
    pub mobile: bool,
    pub proxy: ProxyMode,
    pub headers: HashMap<String, String>,
    pub location: Option<String>,
    pub max_age_ms: Option<u64>,
    pub viewport: Option<Viewport>,
    pub actions: Vec<Action>,
    pub skip_tls_verification: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            formats: vec![Format::Markdown],
            wait_for_ms: 0,
            timeout_ms: 30_000,
            mobile: false,
            proxy: ProxyMode::Basic,
            headers: HashMap::new(),
            location: None,
            max_age_ms: None,
            viewport: None,
            actions: Vec::new(),
            skip_tls_verification: false,
        }
    }
}

/// Tagged sum type for requested output formats (spec.md §9 "dynamic
/// extension points as sum types").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Links,
    Screenshot,
    Json { schema: Option<serde_json::Value> },
    PdfText,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Basic,
    Stealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Tagged action step (spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Wait { ms: u64 },
    Click { selector: String },
    Scroll { ms: u64 },
    Screenshot,
}

/// One per submitted crawl job (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub id: Uuid,
    pub origin_url: String,
    pub team_id: String,
    pub options: CrawlOptions,
    pub scrape_options: ScrapeOptions,
    pub robots_txt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: CrawlState,
    pub kickoff_finished: bool,
    pub max_concurrency: Option<u32>,
    pub zero_data_retention: bool,
    /// Monotonic version used for compare-and-set state transitions.
    pub version: u64,
}

impl CrawlRecord {
    pub fn new(
        origin_url: String,
        team_id: String,
        options: CrawlOptions,
        scrape_options: ScrapeOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin_url,
            team_id,
            options,
            scrape_options,
            robots_txt: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            state: CrawlState::Scraping,
            kickoff_finished: false,
            max_concurrency: None,
            zero_data_retention: false,
            version: 0,
        }
    }
}

/// Per-crawl side tables keyed by crawl id (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlURLSet {
    pub locked_urls: Vec<String>,
    pub job_ids: Vec<Uuid>,
    pub discovery_depth: HashMap<String, u32>,
    pub done_count: u64,
    pub error_count: u64,
    pub credit_count: u64,
}

/// Terminal/non-terminal states of a single scrape unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitState {
    Queued,
    Reserved,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::Completed | UnitState::Failed | UnitState::Cancelled
        )
    }
}

/// Internal flags that bypass externally-billed behavior (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalOptions {
    pub bypass_billing: bool,
    pub save_to_blob: bool,
    pub zero_data_retention: bool,
}

/// One per individual page scrape, standalone or child of a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeUnit {
    pub id: Uuid,
    pub url: String,
    pub team_id: String,
    pub priority: i64,
    pub crawl_id: Option<Uuid>,
    pub scrape_options: ScrapeOptions,
    pub internal_options: InternalOptions,
    pub webhook: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub state: UnitState,
    pub last_error: Option<String>,
}

impl ScrapeUnit {
    pub fn new(
        url: String,
        team_id: String,
        priority: i64,
        scrape_options: ScrapeOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            team_id,
            priority,
            crawl_id: None,
            scrape_options,
            internal_options: InternalOptions::default(),
            webhook: None,
            created_at: Utc::now(),
            attempt_count: 0,
            state: UnitState::Queued,
            last_error: None,
        }
    }

    pub fn for_crawl(mut self, crawl_id: Uuid) -> Self {
        self.crawl_id = Some(crawl_id);
        self
    }
}

/// Idempotency marker (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub key: Uuid,
    pub team_id: String,
    pub inserted_at: DateTime<Utc>,
}

/// An active-job lease held by a team (spec.md §3 `ConcurrencyEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveLease {
    pub unit_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_state_terminal() {
        assert!(CrawlState::Completed.is_terminal());
        assert!(CrawlState::Failed.is_terminal());
        assert!(CrawlState::Cancelled.is_terminal());
        assert!(!CrawlState::Scraping.is_terminal());
    }

    #[test]
    fn unit_state_terminal() {
        assert!(UnitState::Completed.is_terminal());
        assert!(!UnitState::Active.is_terminal());
    }

    #[test]
    fn new_crawl_record_starts_scraping() {
        let record = CrawlRecord::new(
            "https://example.test".into(),
            "team-1".into(),
            CrawlOptions::default(),
            ScrapeOptions::default(),
        );
        assert_eq!(record.state, CrawlState::Scraping);
        assert!(!record.kickoff_finished);
    }
}

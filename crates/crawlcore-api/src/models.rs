//! Wire request/response DTOs (spec.md §4.10, §3).
//!
//! Request bodies accept the source's loose, camelCase, string-shorthand
//! shapes; `validation`/`orchestration` normalize them into the core's
//! canonical `CrawlOptions`/`ScrapeOptions` (spec.md §9 "dynamic
//! extension points as sum types").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportBody {
    pub width: u32,
    pub height: u32,
}

/// Per-page extraction options as received over the wire (spec.md §3
/// `scrape_options`).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptionsBody {
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub wait_for: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub mobile: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub viewport: Option<ViewportBody>,
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
    #[serde(default)]
    pub skip_tls_verification: bool,
    /// Forbidden unless every requested format is `json` (validation.rs).
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub json_schema: Option<serde_json::Value>,
}

/// Crawl-wide traversal options as received over the wire (spec.md §3
/// `options`).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOptionsBody {
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub max_discovery_depth: Option<u32>,
    #[serde(default)]
    pub allow_backward_links: bool,
    #[serde(default)]
    pub allow_external_links: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub ignore_robots_txt: bool,
    #[serde(default)]
    pub ignore_sitemap: bool,
    #[serde(default)]
    pub deduplicate_similar_urls: bool,
    #[serde(default)]
    pub ignore_query_parameters: bool,
    #[serde(default)]
    pub regex_on_full_url: bool,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequestBody {
    pub url: String,
    #[serde(default)]
    pub scrape_options: Option<ScrapeOptionsBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlRequestBody {
    pub url: String,
    #[serde(default)]
    pub crawler_options: Option<CrawlOptionsBody>,
    #[serde(default)]
    pub scrape_options: Option<ScrapeOptionsBody>,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub zero_data_retention: bool,
    #[serde(default)]
    pub idempotency: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchScrapeRequestBody {
    pub urls: Vec<String>,
    #[serde(default)]
    pub scrape_options: Option<ScrapeOptionsBody>,
    #[serde(default)]
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlCreatedResponse {
    pub id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchScrapeCreatedResponse {
    pub id: Uuid,
    pub url_count: usize,
}

/// One scraped page, shaped identically to the result JSON the Worker
/// persists (`crawlcore-worker::processor::CrawlAwareProcessor::process`).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PageResult {
    pub url: Option<String>,
    pub status: Option<u16>,
    pub markdown: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlStatusResponse {
    pub status: String,
    pub total: u64,
    pub completed: u64,
    pub credits_used: u64,
    pub data: Vec<PageResult>,
    pub partial_data: Vec<PageResult>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitErrorEntry {
    pub id: Uuid,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlErrorsResponse {
    pub errors: Vec<UnitErrorEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OngoingCrawlEntry {
    pub id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OngoingCrawlsResponse {
    pub crawls: Vec<OngoingCrawlEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultBody {
    pub title: String,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

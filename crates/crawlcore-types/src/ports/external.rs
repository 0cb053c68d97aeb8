//! External collaborator ports (spec.md §6.1).
//!
//! These are consumed-but-not-reimplemented interfaces: the core is
//! indifferent to how rendering, extraction, billing, auth, and search
//! actually happen. No production adapter for any of these ships in
//! this repository; only test doubles (see `crawlcore-worker`'s test
//! modules) implement them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{Action, Format, ScrapeOptions};

/// Classified fetch failures (spec.md §6.1).
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("timeout")]
    Timeout,
    #[error("bad status: {0}")]
    BadStatus(u16),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("insufficient time to process PDF")]
    InsufficientTimeForPdf,
    #[error("blocked by provider")]
    BlockedByProvider,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub raw_html: Option<String>,
    pub links: Vec<String>,
    pub screenshot: Option<Vec<u8>>,
    pub actions_output: Vec<serde_json::Value>,
    pub pdf_text: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Renders/fetches a single page. The core is indifferent to whether
/// this is a plain HTTP GET or a headless-browser render.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        options: &ScrapeOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<FetchedDocument, FetchError>;
}

#[derive(Debug, Error, Clone)]
pub enum ExtractError {
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Optional per-unit structured extraction over an already-fetched
/// document.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        document: &FetchedDocument,
        schema: Option<&serde_json::Value>,
        prompt: Option<&str>,
    ) -> Result<serde_json::Value, ExtractError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Search provider; errors are swallowed into an empty result list by
/// convention (spec.md §6.1).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: Option<u32>,
    pub country: Option<String>,
}

/// Pre/post-flight credit accounting.
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait Billing: Send + Sync {
    async fn check_credits(&self, team_id: &str, n: u64) -> crate::error::Result<(bool, u64)>;
    async fn bill(&self, team_id: &str, n: u64) -> crate::error::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub team_id: String,
    pub plan: String,
    pub flags: HashMap<String, bool>,
}

/// Authenticates an inbound request, returning the caller's team/plan.
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait Auth: Send + Sync {
    async fn authenticate(&self, api_key: &str) -> crate::error::Result<AuthContext>;
}

/// Optional persistence of large artifacts (screenshots, raw HTML) by
/// opaque key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> crate::error::Result<()>;
    async fn get(&self, key: &str) -> crate::error::Result<Option<Vec<u8>>>;
}

/// Normalizes string-shorthand format requests (`"markdown"`) to the
/// canonical tagged form (spec.md §9).
pub fn normalize_format_shorthand(raw: &str) -> Option<Format> {
    match raw {
        "markdown" => Some(Format::Markdown),
        "html" => Some(Format::Html),
        "rawHtml" | "raw_html" => Some(Format::RawHtml),
        "links" => Some(Format::Links),
        "screenshot" => Some(Format::Screenshot),
        "json" => Some(Format::Json { schema: None }),
        "pdfText" | "pdf_text" => Some(Format::PdfText),
        _ => None,
    }
}

/// Normalizes string-shorthand action steps to the canonical tagged
/// form (spec.md §9).
pub fn normalize_action_shorthand(raw: &str) -> Option<Action> {
    match raw {
        "screenshot" => Some(Action::Screenshot),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_markdown_normalizes() {
        assert_eq!(normalize_format_shorthand("markdown"), Some(Format::Markdown));
    }

    #[test]
    fn unknown_shorthand_is_none() {
        assert_eq!(normalize_format_shorthand("bogus"), None);
    }
}

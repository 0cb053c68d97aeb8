//! Minimal default `Fetcher` (spec.md §6.1): a plain HTTP GET.
//!
//! The real rendering/extraction pipeline (headless browser, HTML-to-
//! markdown conversion) is an out-of-scope external collaborator the
//! core only consumes through the `Fetcher` port — it is not
//! re-specified here. This adapter exists so the worker binary has a
//! concrete, runnable default; production deployments are expected to
//! inject a browser-backed `Fetcher` instead. Grounded on the
//! `reqwest::Client` usage pattern the teacher uses throughout
//! (`riptide-spider/src/sitemap.rs`, `riptide-workers/src/processors.rs`).

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

use crawlcore_types::model::ScrapeOptions;
use crawlcore_types::ports::external::{FetchError, FetchedDocument, Fetcher};

pub struct HttpFetcher {
    client: reqwest::Client,
    link_pattern: Regex,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: crawlcore_utils::http::HttpClientFactory::create_default(),
            link_pattern: Regex::new(r#"href\s*=\s*["']([^"'#]+)["']"#).unwrap(),
        }
    }

    fn extract_links(&self, base: &str, html: &str) -> Vec<String> {
        let Ok(base_url) = url::Url::parse(base) else {
            return Vec::new();
        };
        self.link_pattern
            .captures_iter(html)
            .filter_map(|cap| base_url.join(&cap[1]).ok())
            .map(|u| u.to_string())
            .collect()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &ScrapeOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<FetchedDocument, FetchError> {
        let mut builder = self
            .client
            .get(url)
            .timeout(Duration::from_millis(options.timeout_ms));
        for (key, value) in &options.headers {
            builder = builder.header(key, value);
        }
        let request = builder.send();

        let response = tokio::select! {
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::NetworkError(e.to_string())
                }
            })?,
            _ = cancel.cancelled() => return Err(FetchError::NetworkError("cancelled".into())),
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::BadStatus(status));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;
        let links = self.extract_links(url, &html);

        let mut metadata = HashMap::new();
        metadata.insert("fetched_url".to_string(), serde_json::json!(url));

        Ok(FetchedDocument {
            status,
            headers: HashMap::new(),
            html: Some(html.clone()),
            markdown: None,
            raw_html: Some(html),
            links,
            screenshot: None,
            actions_output: Vec::new(),
            pdf_text: None,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_relative_links_against_base() {
        let fetcher = HttpFetcher::new();
        let html = r#"<a href="/a">a</a><a href='https://other.test/b'>b</a>"#;
        let links = fetcher.extract_links("https://example.test/page", html);
        assert_eq!(links, vec!["https://example.test/a", "https://other.test/b"]);
    }
}

//! Sitemap discovery and parsing (spec.md §4.4 `sitemap_fetch`).
//!
//! Grounded on `riptide-spider/src/sitemap.rs`'s `SitemapParser`:
//! `reqwest::Client` for fetching, `xml-rs`'s `EventReader` for a
//! streaming parse. Best-effort — any failure here yields an empty
//! list rather than propagating, per spec.md.

use std::time::Duration;
use tracing::{debug, warn};
use xml::reader::{EventReader, XmlEvent};

pub struct SitemapFetcher {
    client: reqwest::Client,
}

impl SitemapFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let config = crawlcore_utils::http::HttpConfig::with_user_agent(user_agent).with_timeout(timeout);
        Self {
            client: crawlcore_utils::http::HttpClientFactory::create(&config),
        }
    }

    /// Best-effort discovery: tries `sitemap.xml` at the seed's origin,
    /// parses whatever it gets, and swallows any error into an empty
    /// list (spec.md §4.4: "failure is non-fatal and yields an empty
    /// list").
    pub async fn sitemap_fetch(&self, seed: &str) -> Vec<String> {
        let Ok(seed_url) = url::Url::parse(seed) else {
            return Vec::new();
        };
        let candidate = format!("{}/sitemap.xml", seed_url.origin().ascii_serialization());

        match self.fetch_and_parse(&candidate).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, url = %candidate, "sitemap fetch failed, continuing without it");
                Vec::new()
            }
        }
    }

    async fn fetch_and_parse(&self, sitemap_url: &str) -> Result<Vec<String>, String> {
        debug!(url = sitemap_url, "fetching sitemap");
        let body = self
            .client
            .get(sitemap_url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;
        Ok(parse_sitemap_urls(&body))
    }
}

/// Parses `<loc>` entries from sitemap XML. Tolerant of malformed XML:
/// a parse error on one event simply terminates the scan, returning
/// whatever was collected so far.
pub fn parse_sitemap_urls(xml: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let parser = EventReader::from_str(xml);
    let mut in_loc = false;

    for event in parser {
        match event {
            Ok(XmlEvent::StartElement { name, .. }) if name.local_name == "loc" => {
                in_loc = true;
            }
            Ok(XmlEvent::Characters(data)) if in_loc => {
                urls.push(data);
            }
            Ok(XmlEvent::EndElement { name }) if name.local_name == "loc" => {
                in_loc = false;
            }
            Err(_) => break,
            _ => {}
        }
    }

    urls
}

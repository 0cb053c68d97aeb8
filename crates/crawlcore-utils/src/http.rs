//! HTTP client factory with consistent timeout/pooling defaults.
//!
//! Grounded on `riptide-utils/src/http.rs`'s `HttpConfig`/
//! `HttpClientFactory` — every crate that talks HTTP here (the Worker's
//! `Fetcher`, the Sitemap fetcher, the Webhook Dispatcher, the API's
//! robots.txt client) built its own `reqwest::Client` ad hoc; this
//! collapses that into one place.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub pool_idle_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 10,
            user_agent: format!("crawlcore/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Builds a client from `config`, falling back to `Client::new()` on
    /// build failure (an invalid TLS/proxy config on an otherwise
    /// healthy host is not worth crashing the caller over).
    pub fn create(config: &HttpConfig) -> Client {
        let built = ClientBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build();

        match built {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "falling back to default reqwest client");
                Client::new()
            }
        }
    }

    pub fn create_default() -> Client {
        Self::create(&HttpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_worker_timeout_convention() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.user_agent.starts_with("crawlcore/"));
    }

    #[test]
    fn with_user_agent_overrides_only_the_agent() {
        let config = HttpConfig::with_user_agent("crawlcore-worker/test");
        assert_eq!(config.user_agent, "crawlcore-worker/test");
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn create_never_panics_on_default_config() {
        let _client = HttpClientFactory::create_default();
    }
}

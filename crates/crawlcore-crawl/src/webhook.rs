//! Webhook Dispatcher (spec.md §4.9): at-least-once delivery of
//! lifecycle events.
//!
//! New code — grounded on the teacher's `reqwest::Client` usage pattern
//! (client builder with timeout, as in `riptide-spider/src/sitemap.rs`)
//! and `Job::calculate_next_retry`'s backoff idiom from
//! `riptide-workers/src/job.rs` (reused via `crawlcore_queue::RetryPolicy`
//! for the delivery retry schedule).

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crawlcore_events::{EventType, WebhookEvent};
use crawlcore_queue::RetryPolicy;
use crawlcore_types::error::Result;
use crawlcore_types::ports::kv::KvStore;

fn delivery_queue_key() -> &'static str {
    "webhook:pending"
}

fn delivery_blob_key(delivery_id: Uuid) -> String {
    format!("webhook:delivery:{delivery_id}")
}

pub struct WebhookDispatcher {
    kv: Arc<dyn KvStore>,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(kv: Arc<dyn KvStore>, retry_policy: RetryPolicy) -> Self {
        let config = crawlcore_utils::http::HttpConfig::default().with_timeout(Duration::from_secs(10));
        let client = crawlcore_utils::http::HttpClientFactory::create(&config);
        Self {
            kv,
            client,
            retry_policy,
        }
    }

    /// Emits a lifecycle event. Delivery is at-least-once and unordered
    /// (spec.md §4.9); on failure the event is queued for a bounded
    /// number of retries rather than dropped.
    pub async fn emit(&self, webhook_url: &str, event_type: EventType, id: Uuid, data: serde_json::Value) {
        let event = WebhookEvent::new(event_type, id, data);
        self.attempt_delivery(webhook_url, &event, 0).await;
    }

    async fn attempt_delivery(&self, webhook_url: &str, event: &WebhookEvent, attempt: u32) {
        debug!(url = webhook_url, event_type = event.event_type, "delivering webhook");
        let result = self.client.post(webhook_url).json(event).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(url = webhook_url, "webhook delivered");
            }
            _ => {
                if self.retry_policy.exhausted(attempt) {
                    warn!(url = webhook_url, event_type = event.event_type, "webhook delivery exhausted retries, dropping");
                    return;
                }
                self.enqueue_retry(webhook_url, event, attempt + 1).await;
            }
        }
    }

    async fn enqueue_retry(&self, webhook_url: &str, event: &WebhookEvent, attempt: u32) {
        let delivery_id = Uuid::new_v4();
        let pending = crawlcore_events::PendingDelivery {
            event: event.clone(),
            webhook_url: webhook_url.to_string(),
            attempt_count: attempt,
            next_attempt_at: self.retry_policy.next_retry_at(attempt),
        };
        if let Ok(payload) = serde_json::to_vec(&pending) {
            let _ = self.kv.set(&delivery_blob_key(delivery_id), &payload, None).await;
            let _ = self
                .kv
                .list_push_back(delivery_queue_key(), &delivery_id.to_string())
                .await;
        }
    }

    /// Sweeps the retry queue, attempting due deliveries. Intended to
    /// be called periodically from the dispatcher's background loop.
    pub async fn sweep_retries(&self) -> Result<u64> {
        let ids = self.kv.list_range(delivery_queue_key(), 0, -1).await?;
        let mut attempted = 0u64;

        for id_str in ids {
            let Ok(delivery_id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            let Some(raw) = self.kv.get(&delivery_blob_key(delivery_id)).await? else {
                continue;
            };
            let Ok(pending): std::result::Result<crawlcore_events::PendingDelivery, _> =
                serde_json::from_slice(&raw)
            else {
                continue;
            };

            if chrono::Utc::now() < pending.next_attempt_at {
                continue;
            }

            self.kv.list_remove(delivery_queue_key(), &id_str).await?;
            self.kv.delete(&[delivery_blob_key(delivery_id)]).await?;
            self.attempt_delivery(&pending.webhook_url, &pending.event, pending.attempt_count)
                .await;
            attempted += 1;
        }

        Ok(attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlcore_kv::InMemoryKvStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_delivery_does_not_queue_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let kv = Arc::new(InMemoryKvStore::new());
        let dispatcher = WebhookDispatcher::new(kv.clone(), RetryPolicy::default());
        let url = format!("{}/hook", server.uri());
        dispatcher
            .emit(&url, EventType::CrawlStarted, Uuid::new_v4(), serde_json::json!({}))
            .await;

        assert_eq!(kv.list_len(delivery_queue_key()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_delivery_is_queued_for_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let kv = Arc::new(InMemoryKvStore::new());
        let dispatcher = WebhookDispatcher::new(kv.clone(), RetryPolicy::default());
        let url = format!("{}/hook", server.uri());
        dispatcher
            .emit(&url, EventType::CrawlPage, Uuid::new_v4(), serde_json::json!({}))
            .await;

        assert_eq!(kv.list_len(delivery_queue_key()).await.unwrap(), 1);
    }

    /// A not-yet-due entry ahead of a due one in the queue must survive
    /// the sweep untouched — the sweep must remove the due entry by id,
    /// not by queue position.
    #[tokio::test]
    async fn sweep_does_not_drop_an_earlier_not_due_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let kv = Arc::new(InMemoryKvStore::new());
        let dispatcher = WebhookDispatcher::new(kv.clone(), RetryPolicy::default());
        let url = format!("{}/hook", server.uri());

        let not_due_id = Uuid::new_v4();
        let not_due = crawlcore_events::PendingDelivery {
            event: crawlcore_events::WebhookEvent::new(EventType::CrawlPage, Uuid::new_v4(), serde_json::json!({})),
            webhook_url: url.clone(),
            attempt_count: 0,
            next_attempt_at: chrono::Utc::now() + chrono::Duration::hours(1),
        };
        kv.set(&delivery_blob_key(not_due_id), &serde_json::to_vec(&not_due).unwrap(), None)
            .await
            .unwrap();
        kv.list_push_back(delivery_queue_key(), &not_due_id.to_string()).await.unwrap();

        let due_id = Uuid::new_v4();
        let due = crawlcore_events::PendingDelivery {
            event: crawlcore_events::WebhookEvent::new(EventType::CrawlPage, Uuid::new_v4(), serde_json::json!({})),
            webhook_url: url,
            attempt_count: 0,
            next_attempt_at: chrono::Utc::now() - chrono::Duration::seconds(1),
        };
        kv.set(&delivery_blob_key(due_id), &serde_json::to_vec(&due).unwrap(), None)
            .await
            .unwrap();
        kv.list_push_back(delivery_queue_key(), &due_id.to_string()).await.unwrap();

        let attempted = dispatcher.sweep_retries().await.unwrap();
        assert_eq!(attempted, 1);

        let remaining = kv.list_range(delivery_queue_key(), 0, -1).await.unwrap();
        assert_eq!(remaining, vec![not_due_id.to_string()]);
        assert!(kv.get(&delivery_blob_key(not_due_id)).await.unwrap().is_some());
        assert!(kv.get(&delivery_blob_key(due_id)).await.unwrap().is_none());
    }
}

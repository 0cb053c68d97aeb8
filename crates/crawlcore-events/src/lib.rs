//! Webhook/lifecycle event envelope (spec.md §4.9, §6.2).
//!
//! Grounded on the teacher's `riptide_events::BaseEvent` usage in
//! `riptide-api/src/handlers/crawl.rs` — carried forward as a small
//! standalone crate since the teacher's own `riptide-events` crate also
//! covers internal telemetry events out of this spec's scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle event type tag (spec.md §4.9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CrawlStarted,
    CrawlPage,
    CrawlCompleted,
    CrawlFailed,
    BatchScrapeStarted,
    BatchScrapePage,
    BatchScrapeCompleted,
    BatchScrapeFailed,
}

impl EventType {
    /// Wire representation used in the webhook body's `type` field,
    /// e.g. `"crawl.page"` (spec.md §4.9).
    pub fn wire_name(self) -> &'static str {
        match self {
            EventType::CrawlStarted => "crawl.started",
            EventType::CrawlPage => "crawl.page",
            EventType::CrawlCompleted => "crawl.completed",
            EventType::CrawlFailed => "crawl.failed",
            EventType::BatchScrapeStarted => "batch_scrape.started",
            EventType::BatchScrapePage => "batch_scrape.page",
            EventType::BatchScrapeCompleted => "batch_scrape.completed",
            EventType::BatchScrapeFailed => "batch_scrape.failed",
        }
    }
}

/// Webhook body: `{type, id, data}` (spec.md §6.2). Receivers must
/// tolerate unknown fields in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub id: Uuid,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn new(event_type: EventType, id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.wire_name(),
            id,
            data,
        }
    }
}

/// An event queued for at-least-once delivery, tracking delivery
/// attempts for the dispatcher's bounded retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub event: WebhookEvent,
    pub webhook_url: String,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_spec() {
        assert_eq!(EventType::CrawlPage.wire_name(), "crawl.page");
        assert_eq!(EventType::CrawlCompleted.wire_name(), "crawl.completed");
    }

    #[test]
    fn webhook_event_serializes_type_field() {
        let ev = WebhookEvent::new(EventType::CrawlStarted, Uuid::nil(), serde_json::json!({}));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "crawl.started");
    }
}

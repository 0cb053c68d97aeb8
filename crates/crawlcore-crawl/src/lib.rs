//! Crawl orchestration: state machine, idempotency gate, webhook
//! dispatch, and the limiter/queue bridge (spec.md §4.3, §4.5, §4.6,
//! §4.8, §4.9).

pub mod dispatcher;
pub mod idempotency;
pub mod state_machine;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use idempotency::KvIdempotencyStore;
pub use state_machine::{CrawlStateMachine, LockResult, StateTransitionGuard};
pub use webhook::WebhookDispatcher;

//! Worker processing loop (spec.md §4.7): reserve, fetch, discover,
//! persist, notify, release.

pub mod fetcher;
pub mod processor;
pub mod worker;

pub use fetcher::HttpFetcher;
pub use processor::{CrawlAwareProcessor, ProcessOutcome, ScrapeProcessor, SingleUrlRetryProcessor};
pub use worker::{collect_unit_states, Worker, WorkerConfig, WorkerPool, WorkerStatsSnapshot};

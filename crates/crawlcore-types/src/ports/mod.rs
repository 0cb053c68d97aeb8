//! Hexagonal ports: trait-level interfaces for everything the core
//! depends on but does not implement itself.

pub mod concurrency;
pub mod external;
pub mod idempotency;
pub mod kv;

pub use concurrency::{ConcurrencyLimiter, ConcurrencyStats};
pub use external::{
    Auth, AuthContext, Billing, BlobStore, ExtractError, Extractor, FetchError, FetchedDocument,
    Fetcher, SearchOptions, SearchProvider, SearchResult,
};
pub use idempotency::{IdempotencyStore, IdempotencyToken};
pub use kv::KvStore;

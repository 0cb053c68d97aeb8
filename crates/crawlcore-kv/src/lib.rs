//! Concrete `KvStore` adapters: `InMemoryKvStore` for tests and
//! single-process deployments, `RedisKvStore` for the shared-state
//! deployment spec.md §5 assumes.

pub mod adapters;

pub use adapters::{InMemoryKvStore, RedisKvStore};

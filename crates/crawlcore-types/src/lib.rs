//! Shared domain model, error types, and port traits for CrawlCore.
//!
//! This crate has no I/O of its own; it defines the vocabulary the rest
//! of the workspace shares.

pub mod error;
pub mod model;
pub mod ports;

pub use error::{CoreError, Result};

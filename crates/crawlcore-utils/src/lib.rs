//! Small shared helpers used across the workspace: a single place to
//! build a `reqwest::Client` with consistent timeouts/pooling, and
//! Unix-timestamp conversions for the handful of places that need raw
//! epoch values rather than `DateTime<Utc>`.

pub mod http;
pub mod time;

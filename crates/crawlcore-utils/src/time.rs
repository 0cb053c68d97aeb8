//! Unix-timestamp conversions, grounded on `riptide-utils/src/time.rs`.
//!
//! The Concurrency Limiter scores active leases by their expiry as a
//! Redis sorted-set score (`f64` seconds since the epoch); these two
//! helpers replace the `(Utc::now() + ttl).timestamp() as f64`
//! boilerplate that was previously inlined at every call site.

use chrono::{DateTime, Utc};
use std::time::Duration;

pub fn now_unix_secs() -> i64 {
    Utc::now().timestamp()
}

/// The score a lease acquired now, with time-to-live `ttl`, should be
/// stored under.
pub fn expiry_score_secs(ttl: Duration) -> f64 {
    (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).timestamp() as f64
}

pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_secs_is_plausible() {
        assert!(now_unix_secs() > 1_700_000_000);
    }

    #[test]
    fn expiry_score_is_in_the_future() {
        let score = expiry_score_secs(Duration::from_secs(60));
        assert!(score > now_unix_secs() as f64);
    }
}

//! Exponential backoff with jitter, adapted verbatim in idiom from the
//! teacher's `Job::calculate_next_retry` (`riptide-workers/src/job.rs`).
//! Reused for both job-queue retry scheduling and webhook delivery
//! retries (`crawlcore-crawl::webhook`).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub backoff_multiplier: f64,
    pub max_delay_secs: u64,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_secs: 5,
            backoff_multiplier: 2.0,
            max_delay_secs: 300,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn next_retry_at(&self, attempt_count: u32) -> DateTime<Utc> {
        let base_delay = self.initial_delay_secs as f64;
        let delay_secs = base_delay * self.backoff_multiplier.powi(attempt_count as i32);
        let capped = delay_secs.min(self.max_delay_secs as f64);

        let final_delay = if self.use_jitter {
            let jitter = capped * 0.1 * rand::random::<f64>();
            capped + jitter
        } else {
            capped
        };

        Utc::now() + chrono::Duration::seconds(final_delay as i64)
    }

    pub fn exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }
}

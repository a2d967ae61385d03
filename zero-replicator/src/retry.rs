//! Exponential backoff for the replicator's IO failure mode (`spec.md` §4.7,
//! §7 "IO — retried with backoff; fatal after exhaustion"). Grounded on the
//! enrichment pack's retry-policy shape (a `max_retries`/`initial_delay`/
//! `max_delay`/`exponential_base` struct with jittered delay computation),
//! adapted to this workspace's single IO-failure-class use (the teacher's
//! `retry_on` pattern-matching has no counterpart here: every retryable
//! error in this workspace is already `ZeroError::Io`/`ZeroError::Timeout`).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 8,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        RetryPolicy { max_retries: 0, ..Default::default() }
    }

    /// Delay before the given attempt (1-indexed: `delay_for_attempt(1)` is
    /// the wait before the first retry, not the first try itself).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = RetryPolicy { max_retries: 3, ..Default::default() };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn no_retry_never_retries() {
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }
}

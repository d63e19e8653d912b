//! Linear-backoff retry policy shared by the worker pools.

use std::time::Duration;

/// Attempt count and backoff factor for a retryable operation.
///
/// The delay before re-attempt `n` (1-based) is `n × backoff_factor`,
/// so a policy of 5 attempts at 1 s waits 1 s, 2 s, 3 s, 4 s between
/// its attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 5).
    pub max_attempts: usize,
    /// Base delay multiplied by the attempt index (default: 1 s).
    pub backoff_factor: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_factor: Duration) -> Self {
        RetryPolicy { max_attempts, backoff_factor }
    }

    /// The delay sequence consumed by `tokio_retry2::Retry`.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        let factor = self.backoff_factor;
        (1..self.max_attempts as u32).map(move |attempt| factor * attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let delays: Vec<_> = policy.strategy().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
                Duration::from_millis(40),
            ]
        );
    }

    #[test]
    fn single_attempt_has_no_delays() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1));
        assert_eq!(policy.strategy().count(), 0);
    }
}

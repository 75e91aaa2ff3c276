//! Bounded retry with exponential backoff for store calls.

use std::future::Future;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// How hard to try a store call before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Hard limit on a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the second attempt; doubles after each failure.
    pub base_backoff: Duration,
    /// Cap on the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff. Useful in tests.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to sleep after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Upper bound on the wall time [`run`](Self::run) can take.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let waits: Duration = (1..attempts).map(|a| self.backoff(a)).sum();
        self.attempt_timeout
            .saturating_mul(attempts)
            .saturating_add(waits)
    }

    /// Run `call` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Each attempt is cut off at `attempt_timeout`. Only errors for which
    /// [`Error::is_transient`] holds are retried; the last error is returned
    /// once attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.attempt_timeout)),
            };

            match outcome {
                Ok(value) => {
                    record_attempt(operation, "ok");
                    metrics::operation_duration_ms().record(
                        started.elapsed().as_secs_f64() * 1000.0,
                        &[KeyValue::new("operation", operation)],
                    );
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    record_attempt(operation, "retry");
                    let delay = self.backoff(attempt);
                    debug!(operation, attempt, ?delay, error = %e, "store call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    record_attempt(operation, "error");
                    return Err(e);
                }
            }
        }
    }
}

fn record_attempt(operation: &'static str, result: &'static str) {
    metrics::store_attempts().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            attempt_timeout: Duration::from_millis(10),
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(150),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(150));
        assert_eq!(policy.backoff(10), Duration::from_millis(150));
    }

    #[test]
    fn worst_case_bounds_attempts_and_waits() {
        let policy = RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(100),
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1000),
        };
        // 3 x 100ms attempts + 10ms + 20ms between them
        assert_eq!(policy.worst_case(), Duration::from_millis(330));
    }

    #[test]
    fn worst_case_saturates_on_huge_timeouts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::MAX,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.worst_case(), Duration::MAX);
    }
}

//! Retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// When and how often a failed request is sent again.
///
/// Only errors for which [`StreamError::is_retryable`](crate::StreamError::is_retryable)
/// holds are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,

    /// Maximum delay between retries (caps the backoff).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// The delay that follows `delay`, never above `max_delay`.
    ///
    /// A negative factor yields no delay and a non-finite one jumps to the cap.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let secs = (delay.as_secs_f64() * self.backoff_factor)
            .min(self.max_delay.as_secs_f64())
            .max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Run `attempt` until it succeeds, fails permanently, or the retry
    /// budget is spent.  The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_retries + 1;
        let mut delay = self.initial_delay;
        let mut current = 1;

        loop {
            tracing::debug!(operation, attempt = current, max_attempts, "request attempt");

            match attempt(current).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && current < max_attempts => {
                    tracing::warn!(operation, attempt = current, error = %e, "request failed; retrying");
                    tracing::debug!(delay = ?delay, "retrying after delay");
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    current += 1;
                }
                Err(e) => {
                    if current > 1 {
                        tracing::warn!(operation, attempts = current, error = %e, "request failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::StreamError;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_millis());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![500, 1000, 2000, 4000, 8000, 10_000]);
    }

    #[test]
    fn hand_built_factors_do_not_panic() {
        let delay = Duration::from_millis(500);

        let negative = RetryPolicy {
            backoff_factor: -2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(negative.next_delay(delay), Duration::ZERO);

        let nan = RetryPolicy {
            backoff_factor: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(nan.next_delay(delay), nan.max_delay);

        let infinite = RetryPolicy {
            backoff_factor: f64::INFINITY,
            ..RetryPolicy::default()
        };
        assert_eq!(infinite.next_delay(delay), infinite.max_delay);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(StreamError::HttpStatus {
                            status: 503,
                            body: String::new(),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(StreamError::HttpStatus {
                        status: 400,
                        body: "bad request".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(StreamError::HttpStatus { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_is_respected() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(2)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(StreamError::RequestFailed {
                        reason: "connection refused".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}

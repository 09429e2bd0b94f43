//! Bounded retry with exponential backoff for outbound HTTP calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Delay before retry number `retry_index` (zero-based): the initial backoff doubled each time.
    pub fn backoff_for(&self, retry_index: u32) -> Duration {
        let shift = retry_index.min(16);
        self.initial_backoff.saturating_mul(1_u32 << shift)
    }
}

/// Result of a retried operation together with the number of attempts made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the policy is
/// exhausted. No delay follows the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(error) => {
                if attempt >= max_attempts || !is_retryable(&error) {
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
                let delay = policy.backoff_for(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(300));
        assert_eq!(policy.backoff_for(0), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(600));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1200));
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(
            &fast_policy(3),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err("flaky")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let outcome: RetryOutcome<(), u16> =
            retry_with_backoff(&fast_policy(5), |_| async { Err(404) }, |status| *status >= 500)
                .await;

        assert_eq!(outcome.result, Err(404));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let outcome: RetryOutcome<(), u16> =
            retry_with_backoff(&fast_policy(3), |_| async { Err(503) }, |status| *status >= 500)
                .await;

        assert_eq!(outcome.result, Err(503));
        assert_eq!(outcome.attempts, 3);
    }
}

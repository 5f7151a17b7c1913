use std::future::Future;
use std::time::Duration;

use crate::error::NodeError;

/// Outcome of one attempt at a node call.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    /// Worth retrying the identical request.
    Transient(NodeError),
    /// Retrying the identical request cannot help.
    Fatal(NodeError),
}

impl<T> From<Result<T, NodeError>> for Attempt<T> {
    fn from(result: Result<T, NodeError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_retryable() => Attempt::Transient(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: NodeError,
    /// True when the loop stopped on a fatal attempt rather than running out
    /// of retries.
    pub fatal: bool,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds, returns a fatal attempt, or the retry
    /// budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fatal(error) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                        fatal: true,
                    })
                }
                Attempt::Transient(error) => {
                    if attempt >= self.max_attempts() {
                        return Err(RetryFailure {
                            attempts: attempt,
                            error,
                            fatal: false,
                        });
                    }

                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        what,
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "RPC call failed, retrying..."
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(7), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = fast_policy(3)
            .run("test", move |_| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Attempt::Transient(NodeError::Timeout(10))
                } else {
                    Attempt::Success(n)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result: Result<(), _> = fast_policy(2)
            .run("test", |_| async {
                Attempt::Transient(NodeError::Transport("reset".into()))
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(!failure.fatal);
    }

    #[tokio::test]
    async fn test_fatal_attempt_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast_policy(5)
            .run("test", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::Fatal(NodeError::Rejected("invalid params".into()))
            })
            .await;

        let failure = result.unwrap_err();
        assert!(failure.fatal);
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{Error, Transient};
use crate::retry::RetryPolicy;

/// Retry plus circuit breaker, applied around one remote call at a time.
///
/// Clones share the breaker, so every pipeline built from the same policy
/// observes the same dependency health.
#[derive(Clone, Debug, Default)]
pub struct ResiliencePolicy {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResiliencePolicy {
    /// Creates a policy with its own breaker.
    #[must_use]
    pub fn new(retry: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(breaker)),
            retry,
        }
    }

    /// Replaces the retry policy, keeping the breaker.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shares an existing breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// The breaker guarding calls made through this policy.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs `call` under the policy.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_until_cancelled`].
    pub async fn execute<F, Fut, T, E>(&self, operation: &str, call: F) -> Result<T, Error<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Transient + 'static,
    {
        self.execute_until_cancelled(operation, &CancellationToken::new(), call)
            .await
    }

    /// Runs `call` under the policy, abandoning it as soon as `cancel` fires.
    ///
    /// Each attempt is subject to the per-attempt timeout. Transient failures
    /// and timeouts are retried with exponential backoff; permanent failures
    /// return immediately and do not count against the breaker.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` without calling when the breaker rejects,
    /// `Cancelled` when `cancel` fires, `Exhausted` with the last failure,
    /// or `Timeout` when every attempt timed out.
    pub async fn execute_until_cancelled<F, Fut, T, E>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, Error<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Transient + 'static,
    {
        let mut attempts = 0;
        let mut delay = self.retry.base_delay;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    operation: operation.to_string(),
                });
            }

            if !self.breaker.allow_request() {
                debug!(operation, "circuit open, rejecting call");
                return Err(Error::CircuitOpen {
                    operation: operation.to_string(),
                });
            }

            attempts += 1;

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                outcome = self.attempt(call()) => outcome,
            };

            match outcome {
                Some(Ok(value)) => {
                    self.breaker.report_success();
                    if attempts > 1 {
                        debug!(operation, attempts, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Some(Err(e)) if !e.is_transient() => {
                    debug!(operation, error = ?e, "operation failed with non-retriable error");
                    return Err(Error::Exhausted {
                        operation: operation.to_string(),
                        attempts,
                        source: e,
                    });
                }
                Some(Err(e)) => {
                    self.breaker.report_failure();
                    if attempts >= self.retry.max_attempts {
                        error!(operation, attempts, error = ?e, "operation failed after maximum retries");
                        return Err(Error::Exhausted {
                            operation: operation.to_string(),
                            attempts,
                            source: e,
                        });
                    }
                    warn!(
                        operation,
                        attempt = attempts,
                        max_attempts = self.retry.max_attempts,
                        delay = ?delay,
                        error = ?e,
                        "operation failed, retrying"
                    );
                }
                None => {
                    self.breaker.report_failure();
                    if attempts >= self.retry.max_attempts {
                        error!(
                            operation,
                            attempts,
                            timeout = ?self.retry.operation_timeout,
                            "operation timed out after maximum retries"
                        );
                        return Err(Error::Timeout {
                            operation: operation.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        operation,
                        attempt = attempts,
                        timeout = ?self.retry.operation_timeout,
                        delay = ?delay,
                        "operation timed out, retrying"
                    );
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }

            delay = self.retry.next_delay(delay);
        }
    }

    /// One attempt; `None` when it timed out.
    async fn attempt<Fut, T, E>(&self, call: Fut) -> Option<Result<T, E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match self.retry.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.ok(),
            None => Some(call.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tracing_test::traced_test;

    use crate::breaker::CircuitState;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("flaky")]
        Flaky,
        #[error("fatal")]
        Fatal,
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    fn policy(max_attempts: usize, failure_threshold: u32) -> ResiliencePolicy {
        ResiliencePolicy::new(
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                operation_timeout: Some(Duration::from_secs(1)),
                jitter: false,
            },
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 1,
                timeout: Duration::from_secs(30),
            },
        )
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let policy = policy(3, 10);
        let calls = AtomicUsize::new(0);

        let result = policy
            .execute("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(logs_contain("operation failed, retrying"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let policy = policy(5, 10);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .execute("fatal", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            })
            .await;

        assert_matches!(
            result,
            Err(Error::Exhausted {
                attempts: 1,
                source: TestError::Fatal,
                ..
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_opens_breaker() {
        let policy = policy(2, 2);

        let result: Result<(), _> = policy
            .execute("down", || async { Err(TestError::Flaky) })
            .await;
        assert_matches!(result, Err(Error::Exhausted { attempts: 2, .. }));
        assert_eq!(policy.breaker().state(), CircuitState::Open);

        let calls = AtomicUsize::new(0);
        let result: Result<(), TestError> = policy
            .execute("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .map_err(|e: Error<TestError>| match e {
                Error::CircuitOpen { .. } => TestError::Fatal,
                _ => TestError::Flaky,
            });

        assert_matches!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried() {
        let policy = policy(2, 10);

        let result: Result<(), Error<TestError>> = policy
            .execute("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_matches!(result, Err(Error::Timeout { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retries() {
        let policy = policy(100, 1000);
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            canceller.cancel();
        });

        let result: Result<(), _> = policy
            .execute_until_cancelled("flaky", &cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Flaky)
            })
            .await;

        assert_matches!(result, Err(Error::Cancelled { .. }));
        assert!(calls.load(Ordering::SeqCst) < 100);
    }
}

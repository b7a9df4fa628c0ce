//! Retry with classified backoff over an injectable sleeper.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::models::HarvestConfig;
use crate::domain::ports::{FailureKind, ProviderError, Sleeper, TokioSleeper};

/// Errors that know whether another attempt could help.
pub trait Retryable: Display {
    fn failure_kind(&self) -> FailureKind;
}

impl Retryable for ProviderError {
    fn failure_kind(&self) -> FailureKind {
        self.kind()
    }
}

/// How long to wait before attempt `n + 1` after attempt `n` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffSchedule {
    /// `min(cap, base * 2^attempt)`, with a longer base for rate limits
    Exponential {
        rate_limit_base_ms: u64,
        transient_base_ms: u64,
        cap_ms: u64,
    },
    /// `step * attempt`
    Linear { step_ms: u64 },
}

/// Outcome of a call that never succeeded.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Calls made, including the last one
    pub attempts: u32,
    pub last_error: E,
}

/// Retry policy with per-class backoff.
///
/// Rate-limited failures back off longer than other transient failures;
/// permanent failures are returned after the first call.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    schedule: BackoffSchedule,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Exponential policy. `max_attempts` is clamped to at least one call.
    pub fn exponential(
        max_attempts: u32,
        rate_limit_base_ms: u64,
        transient_base_ms: u64,
        cap_ms: u64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule: BackoffSchedule::Exponential {
                rate_limit_base_ms,
                transient_base_ms,
                cap_ms,
            },
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Linear policy, used for secondary-model calls.
    pub fn linear(max_attempts: u32, step_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule: BackoffSchedule::Linear { step_ms },
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Policy for provider calls during a harvest.
    pub fn from_harvest_config(config: &HarvestConfig) -> Self {
        Self::exponential(
            config.max_attempts,
            config.rate_limit_base_ms,
            config.transient_base_ms,
            config.rate_limit_cap_ms,
        )
    }

    /// Replace the delay source.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Delay after a failed attempt (1-based) of the given class.
    pub fn backoff(&self, kind: FailureKind, attempt: u32) -> Duration {
        let ms = match (self.schedule, kind) {
            (_, FailureKind::Permanent) => 0,
            (
                BackoffSchedule::Exponential {
                    rate_limit_base_ms,
                    transient_base_ms,
                    cap_ms,
                },
                kind,
            ) => {
                let base = if kind == FailureKind::RateLimited {
                    rate_limit_base_ms
                } else {
                    transient_base_ms
                };
                base.saturating_mul(2_u64.saturating_pow(attempt)).min(cap_ms)
            }
            (BackoffSchedule::Linear { step_ms }, _) => {
                step_ms.saturating_mul(u64::from(attempt))
            }
        };
        Duration::from_millis(ms)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.failure_kind();
                    if kind == FailureKind::Permanent || attempt >= self.max_attempts {
                        warn!(
                            label,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %err,
                            "giving up"
                        );
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: err,
                        });
                    }

                    let delay = self.backoff(kind, attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        rate_limited = kind == FailureKind::RateLimited,
                        backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn policy(sleeper: Arc<RecordingSleeper>) -> RetryPolicy {
        RetryPolicy::exponential(5, 10_000, 2_000, 120_000).with_sleeper(sleeper)
    }

    #[test]
    fn test_rate_limit_backoff_is_capped() {
        let policy = RetryPolicy::exponential(5, 10_000, 2_000, 120_000);
        assert_eq!(policy.backoff(FailureKind::RateLimited, 1), Duration::from_secs(20));
        assert_eq!(policy.backoff(FailureKind::RateLimited, 2), Duration::from_secs(40));
        assert_eq!(policy.backoff(FailureKind::RateLimited, 3), Duration::from_secs(80));
        assert_eq!(policy.backoff(FailureKind::RateLimited, 4), Duration::from_secs(120));
        assert_eq!(policy.backoff(FailureKind::RateLimited, 40), Duration::from_secs(120));
    }

    #[test]
    fn test_transient_backoff_is_shorter() {
        let policy = RetryPolicy::exponential(5, 10_000, 2_000, 120_000);
        assert_eq!(policy.backoff(FailureKind::Transient, 1), Duration::from_secs(4));
        assert_eq!(policy.backoff(FailureKind::Transient, 2), Duration::from_secs(8));
        assert!(
            policy.backoff(FailureKind::Transient, 3) < policy.backoff(FailureKind::RateLimited, 3)
        );
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(3, 5_000);
        assert_eq!(policy.backoff(FailureKind::Transient, 1), Duration::from_secs(5));
        assert_eq!(policy.backoff(FailureKind::Transient, 2), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::linear(0, 1).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let result: Result<u32, RetryExhausted<ProviderError>> =
            policy(sleeper.clone()).execute("t", |_| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = policy(sleeper.clone())
            .execute("t", move |_| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::Network("reset".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(4), Duration::from_secs(8)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_makes_exactly_max_attempts() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), _> = policy(sleeper.clone())
            .execute("t", move |_| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::RateLimited("slow down".into()))
                }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 5);
        assert!(exhausted.last_error.is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // No sleep after the final attempt.
        assert_eq!(sleeper.delays.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), _> = policy(sleeper.clone())
            .execute("t", move |_| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::InvalidRequest("bad".into()))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attempt_number_passed_to_operation() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _: Result<(), _> = RetryPolicy::linear(3, 1)
            .with_sleeper(sleeper)
            .execute("t", move |attempt| {
                seen_clone.lock().unwrap().push(attempt);
                async { Err(ProviderError::Timeout(Duration::from_secs(1))) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}

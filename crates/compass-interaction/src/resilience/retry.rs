//! Bounded retries with exponential backoff and jitter.

use crate::agent::CompletionError;
use crate::resilience::breaker::CircuitBreaker;
use compass_core::error::{CompassError, Result, RetryAction};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry tuning for one class of upstream operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    /// Each delay is scaled by a factor drawn from `[1 - f, 1 + f]`.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    /// The pre-jitter delay applied after attempt `attempt` (1-based) fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_fraction <= 0.0 {
            return delay;
        }
        let low = (1.0 - self.jitter_fraction).max(0.0);
        let high = 1.0 + self.jitter_fraction;
        delay.mul_f64(rand::thread_rng().gen_range(low..=high))
    }

    /// Runs `op` under this policy, consulting `breaker` before every attempt.
    ///
    /// A breaker denial aborts without consuming attempts. Every real attempt
    /// reports its outcome to the breaker. Retries stay invisible to the
    /// caller; what escapes is one of:
    ///
    /// - the successful value,
    /// - [`CompassError::UpstreamUnavailable`] when the breaker is open,
    /// - [`CompassError::UpstreamTransient`] when the retry budget is spent,
    /// - a terminal validation error when upstream rejected the request.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        breaker: &CircuitBreaker,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CompletionError>>,
    {
        let mut attempt = 0u32;
        loop {
            if let Err(open) = breaker.allow() {
                tracing::warn!(
                    operation,
                    retry_after_secs = open.retry_after.as_secs_f64(),
                    "circuit breaker open; short-circuiting upstream call"
                );
                return Err(CompassError::UpstreamUnavailable {
                    retry_after_secs: open.retry_after.as_secs_f64(),
                });
            }

            attempt += 1;
            match op().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure();

                    if !err.is_retryable() {
                        tracing::warn!(operation, attempt, error = %err, "terminal upstream failure");
                        return Err(CompassError::validation(
                            "upstream_rejected",
                            err.to_string(),
                            RetryAction::None,
                        ));
                    }

                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "retryable upstream failure"
                    );

                    if attempt >= self.max_attempts {
                        return Err(CompassError::UpstreamTransient {
                            message: format!(
                                "{operation} failed after {attempt} attempts: {err}"
                            ),
                        });
                    }

                    tokio::time::sleep(self.jittered(self.delay_for_attempt(attempt))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::breaker::BreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            jitter_fraction: 0.25,
        }
    }

    fn transient() -> CompletionError {
        CompletionError::Transient {
            status_code: Some(503),
            message: "overloaded".to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_the_configured_band() {
        let policy = RetryPolicy {
            jitter_fraction: 0.25,
            ..fast_policy()
        };
        let base = Duration::from_millis(100);
        for _ in 0..200 {
            let jittered = policy.jittered(base);
            assert!(jittered >= Duration::from_millis(75), "{jittered:?}");
            assert!(jittered <= Duration::from_millis(125), "{jittered:?}");
        }
    }

    #[tokio::test]
    async fn transient_failures_retry_up_to_max_attempts() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 10,
            recovery_time: Duration::from_secs(30),
        });
        let calls = AtomicU32::new(0);

        let result: Result<String> = fast_policy()
            .run("completion.chat", &breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            CompassError::UpstreamTransient { message } => {
                assert!(message.contains("after 3 attempts"));
            }
            other => panic!("expected transient error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_failure_stops_at_attempt_one() {
        let breaker = CircuitBreaker::default();
        let calls = AtomicU32::new(0);

        let result: Result<String> = fast_policy()
            .run("completion.goal", &breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CompletionError::Terminal {
                        status_code: Some(400),
                        message: "unsupported input".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert_eq!(err.retry_action(), RetryAction::None);
        assert_eq!(err.error_code(), "upstream_rejected");
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let breaker = CircuitBreaker::default();
        let calls = AtomicU32::new(0);

        let result = fast_policy()
            .run("completion.chat", &breaker, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok("recovered".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn open_breaker_aborts_without_consuming_attempts() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_time: Duration::from_secs(60),
        });
        breaker.record_failure();
        let calls = AtomicU32::new(0);

        let result: Result<String> = fast_policy()
            .run("completion.chat", &breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("unreachable".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result.unwrap_err() {
            CompassError::UpstreamUnavailable { retry_after_secs } => {
                assert!(retry_after_secs > 0.0);
            }
            other => panic!("expected unavailable error, got {other:?}"),
        }
    }
}

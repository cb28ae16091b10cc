//! Retry with exponential backoff and jitter.

use super::error::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy applied to transient LLM failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// Backoff multiplier per attempt.
    pub multiplier: f64,
    /// Whether to apply ±10% jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Disable jitter (deterministic delays, mainly for tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff delay for the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let millis = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }

    /// Run `operation`, retrying transient failures up to the budget.
    ///
    /// A non-retryable error is surfaced immediately. When the budget is
    /// exhausted the final error is wrapped in
    /// [`LlmError::RetriesExhausted`] so callers can distinguish a policy
    /// failure from a single-shot one. The operation is invoked at most
    /// `max_retries + 1` times.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> LlmError {
        LlmError::Upstream {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: false,
        };
        assert!(policy.delay_for(10) <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn success_is_not_retried() {
        let policy = RetryPolicy::new(3);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();

        let value = policy
            .run(|| {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LlmError>(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::new(3)
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();

        let value = policy
            .run(|| {
                let calls = calls_ref.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_calls_upstream_exactly_n_plus_one_times() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::new(2)
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();

        let err = policy
            .run(|| {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            LlmError::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let policy = RetryPolicy::new(3);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_ref = calls.clone();

        let err = policy
            .run(|| {
                let calls = calls_ref.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(LlmError::Upstream {
                        status: 401,
                        message: "unauthorized".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, LlmError::Upstream { status: 401, .. }));
    }
}

//! Exponential backoff with jitter for provider calls
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. Success → return
//! 3. Retryable failure ([`SourceError::Unavailable`]) with attempts left →
//!    sleep `max(backoff ± jitter, Retry-After)` and retry
//! 4. Non-retryable failure or attempts exhausted → return the last error
//!
//! Backoff doubles per attempt from `initial_backoff`, capped at `max_backoff`.

use crate::adapters::SourceError;
use rand::Rng;
use rollcall_common::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Fraction of the backoff added or removed at random (0.0-1.0)
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Backoff with jitter applied, never above `max_backoff`
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.base_backoff(retry);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        base.mul_f64(1.0 + spread).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `operation` under `policy`, retrying only retryable source errors
pub async fn retry_with_backoff<F, Fut, T>(
    provider: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(provider, attempt, "Provider call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    provider,
                    attempt,
                    error = %err,
                    "Provider call failed: retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let mut delay = policy.backoff(attempt);
                if let SourceError::Unavailable {
                    retry_after: Some(requested),
                    ..
                } = &err
                {
                    delay = delay.max(*requested);
                }

                tracing::warn!(
                    provider,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Provider unavailable, will retry after backoff"
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
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            jitter: 0.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            jitter: 0.5,
        };
        for _ in 0..100 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff("p", &fast_policy(4), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SourceError::unavailable("p", "503"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry_with_backoff("p", &fast_policy(3), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::unavailable("p", "timeout"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry_with_backoff("p", &fast_policy(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Rejected {
                    provider: "p".into(),
                    reason: "401".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

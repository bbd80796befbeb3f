//! Retry-with-backoff around a suspendable unit of work (C3, spec §4.3).
//!
//! `RateLimited(retry_after)` is awaited exactly for the advertised interval
//! and does not consume a retry slot. Any other retryable error waits
//! `base * 2^attempt` plus jitter, up to `max_retries`. All other errors
//! propagate immediately.

use std::time::Duration;

use rand::Rng;

use crate::error::AcquisitionError;
use kg_core::CoreError;

pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run `f` until it succeeds, exhausts `max_retries`, or fails with a
    /// non-retryable error.
    pub async fn run<T, F, Fut>(&self, mut f: F) -> Result<T, AcquisitionError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AcquisitionError>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(AcquisitionError::Core(CoreError::RateLimited { retry_after })) => {
                    tokio::time::sleep(retry_after).await;
                    // Rate-limit waits do not consume a retry slot.
                    continue;
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..=exp * 0.1);
        Duration::from_secs_f64(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32, AcquisitionError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32, AcquisitionError> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AcquisitionError::Core(CoreError::Transient("x".into())))
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
    async fn exhausting_retries_surfaces_the_error() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        let result: Result<u32, AcquisitionError> = policy
            .run(|| async { Err(AcquisitionError::Core(CoreError::Transient("x".into()))) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32, AcquisitionError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AcquisitionError::Core(CoreError::NotFound)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_waits_full_interval_without_consuming_retry_slot() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<u32, AcquisitionError> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AcquisitionError::Core(CoreError::RateLimited {
                            retry_after: Duration::from_millis(100),
                        }))
                    } else {
                        Ok(1)
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }
}

//! Per-source token bucket (C1, spec §4.1).
//!
//! `acquire()` blocks the caller until a token is available; it never drops
//! a request and never returns an error. Concurrent callers are served FIFO
//! because they all contend on the same `Mutex`, and `tokio::sync::Mutex`
//! wakes waiters in acquisition order.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter for a single external source.
///
/// `refill_per_sec` tokens are added continuously (not in discrete ticks);
/// `burst` caps how many can accumulate.
pub struct RateLimiter {
    refill_per_sec: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            refill_per_sec,
            burst: burst as f64,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a single token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn burst_tokens_are_available_immediately() {
        let limiter = RateLimiter::new(1.0, 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_waits_for_refill() {
        let limiter = RateLimiter::new(2.0, 1);
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(490));
    }

    #[tokio::test]
    async fn concurrent_callers_all_eventually_acquire() {
        let limiter = Arc::new(RateLimiter::new(50.0, 2));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}

//! Per-source circuit breaker (C2, spec §4.2).
//!
//! Three states gate outbound calls to a source: `CLOSED` permits everything,
//! `OPEN` fails fast, `HALF_OPEN` permits exactly one probe. State lives
//! behind an `RwLock` since failures are rare relative to reads.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::{AcquisitionError, AcquisitionResult};
use kg_core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    /// Timestamps of consecutive failures within `window`, oldest first.
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
    /// Whether the single HALF_OPEN probe has already been dispatched.
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            window,
            cooldown,
            inner: RwLock::new(Inner {
                state: State::Closed,
                failures: Vec::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Fails fast with `CircuitOpen` when the breaker is OPEN; when OPEN has
    /// aged past `cooldown`, transitions to HALF_OPEN and permits one probe.
    pub fn check(&self) -> AcquisitionResult<()> {
        let mut inner = self.inner.write().expect("circuit breaker lock poisoned");
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => {
                if inner.probe_in_flight {
                    Err(AcquisitionError::Core(CoreError::CircuitOpen))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
            State::Open => {
                let opened_at = inner.opened_at.expect("OPEN state always has opened_at");
                if Instant::now().duration_since(opened_at) >= self.cooldown {
                    inner.state = State::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(AcquisitionError::Core(CoreError::CircuitOpen))
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write().expect("circuit breaker lock poisoned");
        inner.state = State::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write().expect("circuit breaker lock poisoned");
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.failures.clear();
            }
            State::Closed | State::Open => {
                let now = Instant::now();
                inner.failures.push(now);
                let window = self.window;
                inner.failures.retain(|t| now.duration_since(*t) <= window);
                if inner.failures.len() as u32 >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(now);
                    inner.failures.clear();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_millis(50))
    }

    #[test]
    fn starts_closed() {
        let cb = breaker();
        assert!(cb.check().is_ok());
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.check().is_ok());
        cb.record_failure();
        assert!(matches!(
            cb.check(),
            Err(AcquisitionError::Core(CoreError::CircuitOpen))
        ));
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.check().is_ok());
    }

    #[tokio::test]
    async fn half_open_after_cooldown_permits_one_probe_then_fails_fast() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.check().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.check().is_ok());
        assert!(cb.check().is_err());
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.check().is_ok());
        cb.record_failure();
        assert!(cb.check().is_err());
    }

    #[tokio::test]
    async fn half_open_success_closes_circuit() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.check().is_ok());
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.check().is_ok());
    }
}

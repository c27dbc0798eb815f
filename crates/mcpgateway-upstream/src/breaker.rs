//! Per-upstream circuit breaker.
//!
//! Closed counts consecutive failures; at the threshold the circuit opens
//! and rejects calls for the configured window. After the window one
//! trial request runs half-open: success closes the circuit, failure
//! re-opens it for another window.

use crate::{UpstreamError, UpstreamResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow; consecutive failures are counted
    Closed,
    /// Calls are rejected until the window elapses
    Open,
    /// One trial call is allowed through
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// The circuit breaker for one upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    open_for: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with the given trip threshold and open window
    pub fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            }),
            threshold,
            open_for,
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        match &*self.inner.lock() {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Gate a call. Transitions Open to HalfOpen when the window has
    /// elapsed and admits exactly one trial request.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Unavailable` while the circuit rejects.
    pub fn check(&self) -> UpstreamResult<()> {
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed { .. } => Ok(()),
            Inner::Open { until } => {
                if Instant::now() >= *until {
                    *inner = Inner::HalfOpen {
                        trial_in_flight: true,
                    };
                    Ok(())
                } else {
                    Err(UpstreamError::Unavailable("circuit open".into()))
                }
            }
            Inner::HalfOpen { trial_in_flight } => {
                if *trial_in_flight {
                    Err(UpstreamError::Unavailable(
                        "circuit half-open, trial in flight".into(),
                    ))
                } else {
                    *trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.threshold {
                    *inner = Inner::Open {
                        until: Instant::now() + self.open_for,
                    };
                }
            }
            Inner::HalfOpen { .. } => {
                *inner = Inner::Open {
                    until: Instant::now() + self.open_for,
                };
            }
            Inner::Open { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_and_recovers_via_half_open() {
        let breaker = CircuitBreaker::new(5, Duration::from_millis(20));
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.check().is_err());

        std::thread::sleep(Duration::from_millis(25));
        // one trial allowed, a second is rejected
        assert!(breaker.check().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.check().is_err());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

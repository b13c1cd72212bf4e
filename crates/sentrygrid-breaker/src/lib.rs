//! Circuit breaker protecting the bus and the agent from retry storms.
//!
//! `now`/`Instant` values are passed in explicitly rather than read from a hidden global
//! clock, which also makes the open/half-open timing deterministically testable without
//! real sleeps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Numeric values match the `agent_breaker_state` gauge encoding: 0=CLOSED,
/// 1=HALF_OPEN, 2=OPEN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    /// Default configuration: `breaker_failure_threshold` (5), `breaker_open_seconds`
    /// (30).
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Returns whether a call may proceed right now. CLOSED always allows; OPEN allows
    /// only after `open_duration` has elapsed (transitioning to HALF_OPEN and admitting
    /// exactly one probe call); HALF_OPEN allows only while no probe call is already
    /// outstanding.
    pub fn allow_call(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed_since_open = inner
                    .opened_at
                    .map(|opened| now.saturating_duration_since(opened))
                    .unwrap_or(Duration::MAX);
                if elapsed_since_open >= self.open_duration {
                    info!("circuit breaker: OPEN -> HALF_OPEN, admitting probe call");
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call. From HALF_OPEN this closes the breaker and resets
    /// counters; from CLOSED this resets the consecutive-failure streak.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                info!("circuit breaker: HALF_OPEN -> CLOSED");
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.half_open_probe_in_flight = false;
            }
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::Open => {
                debug!("circuit breaker: success recorded while OPEN, ignoring");
            }
        }
    }

    /// Records a failed call, opening the breaker on the `failure_threshold`-th
    /// consecutive failure (from CLOSED) or immediately (from HALF_OPEN).
    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker: CLOSED -> OPEN"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            BreakerState::HalfOpen => {
                warn!("circuit breaker: HALF_OPEN probe failed -> OPEN");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.half_open_probe_in_flight = false;
            }
            BreakerState::Open => {
                debug!("circuit breaker: failure recorded while already OPEN, ignoring");
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));
        let now = Instant::now();
        assert!(cb.allow_call(now));
        cb.record_failure(now);
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure(now);
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure(now);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn open_short_circuits_calls_until_duration_elapses() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        cb.record_failure(t0);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow_call(t0));
        assert!(!cb.allow_call(t0 + Duration::from_millis(50)));
        assert!(cb.allow_call(t0 + Duration::from_millis(101)));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_admits_exactly_one_probe_at_a_time() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        let t0 = Instant::now();
        cb.record_failure(t0);
        let t1 = t0 + Duration::from_millis(20);
        assert!(cb.allow_call(t1));
        // A second concurrent call while the probe is outstanding must be refused.
        assert!(!cb.allow_call(t1));
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        let t0 = Instant::now();
        cb.record_failure(t0);
        let t1 = t0 + Duration::from_millis(20);
        assert!(cb.allow_call(t1));
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow_call(t1));
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        let t0 = Instant::now();
        cb.record_failure(t0);
        let t1 = t0 + Duration::from_millis(20);
        assert!(cb.allow_call(t1));
        cb.record_failure(t1);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn success_in_closed_state_resets_failure_streak() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));
        let now = Instant::now();
        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_success();
        cb.record_failure(now);
        assert_eq!(cb.state(), BreakerState::Closed, "streak should have reset");
    }
}

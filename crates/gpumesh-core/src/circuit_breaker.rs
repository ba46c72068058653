use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Runtime circuit state for source upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays Open before a recovery probe is allowed.
    pub recovery_timeout: Duration,
    /// Consecutive successes in HalfOpen needed to close the circuit.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_transition: Instant,
    trip_count: u64,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_transition: Instant::now(),
            trip_count: 0,
        }
    }

    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.last_transition = Instant::now();
    }
}

/// Point-in-time view of a breaker, used by the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trip_count: u64,
    pub seconds_in_state: f64,
}

/// Thread-safe circuit breaker.
///
/// State transitions happen only inside `try_acquire`, `record_success`,
/// `record_failure`, and `reset`, all under a single mutex so a transition
/// and its counter update are observed atomically.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::new()),
        }
    }

    /// Gate a call attempt. Open circuits reject with the remaining recovery
    /// time; the Open -> HalfOpen transition is evaluated lazily here.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.last_transition.elapsed();
                if elapsed >= self.config.recovery_timeout {
                    inner.transition(CircuitState::HalfOpen);
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(self.config.recovery_timeout - elapsed)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes = inner.half_open_successes.saturating_add(1);
            if inner.half_open_successes >= self.config.half_open_max_calls {
                inner.transition(CircuitState::Closed);
                inner.half_open_successes = 0;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                // One failure during the recovery probe restarts the timer.
                inner.transition(CircuitState::Open);
                inner.half_open_successes = 0;
            }
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.transition(CircuitState::Open);
                    inner.trip_count = inner.trip_count.saturating_add(1);
                }
            }
            CircuitState::Open => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            }
        }
    }

    /// Manual reset: forces Closed and zeroes all counters.
    pub fn reset(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        *inner = CircuitInner::new();
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .expect("circuit breaker lock is not poisoned")
            .state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        CircuitBreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trip_count: inner.trip_count,
            seconds_in_state: inner.last_transition.elapsed().as_secs_f64(),
        }
    }

    /// Whether calls are currently allowed through (Closed or HalfOpen).
    pub fn is_call_permitted(&self) -> bool {
        self.state() != CircuitState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64, half_open: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            half_open_max_calls: half_open,
        })
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let breaker = breaker(3, 100, 3);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().trip_count, 1);
    }

    #[test]
    fn success_in_closed_resets_failure_streak() {
        let breaker = breaker(3, 100, 3);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn open_rejects_with_remaining_recovery_time() {
        let breaker = breaker(1, 200, 3);
        breaker.record_failure();

        let retry_after = breaker.try_acquire().expect_err("circuit should be open");
        assert!(retry_after <= Duration::from_millis(200));
        assert!(retry_after > Duration::from_millis(100));
    }

    #[test]
    fn half_open_closes_after_required_successes() {
        let breaker = breaker(1, 1, 3);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_first_failure() {
        let breaker = breaker(1, 1, 3);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        // Recovery timer restarted; still only one Closed -> Open trip.
        assert_eq!(breaker.snapshot().trip_count, 1);
    }

    #[test]
    fn manual_reset_forces_closed_and_zeroes_counters() {
        let breaker = breaker(1, 60_000, 3);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.trip_count, 0);
        assert!(breaker.try_acquire().is_ok());
    }
}

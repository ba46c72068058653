use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default)]
struct MetricsInner {
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_response_time: Duration,
    rate_limit_hits: u64,
    circuit_open_rejections: u64,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
}

/// Serializable metrics view for the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetricsSnapshot {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub rate_limit_hits: u64,
    pub circuit_open_rejections: u64,
    pub seconds_since_last_success: Option<f64>,
    pub seconds_since_last_failure: Option<f64>,
}

/// Per-source call counters and timings feeding health classification.
#[derive(Debug, Default)]
pub struct SourceMetrics {
    inner: Mutex<MetricsInner>,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, duration: Duration, success: bool) {
        let mut inner = self.inner.lock().expect("metrics lock is not poisoned");
        inner.total_calls = inner.total_calls.saturating_add(1);
        inner.total_response_time += duration;
        if success {
            inner.total_successes = inner.total_successes.saturating_add(1);
            inner.last_success = Some(Instant::now());
        } else {
            inner.total_failures = inner.total_failures.saturating_add(1);
            inner.last_failure = Some(Instant::now());
        }
    }

    pub fn record_rate_limit_hit(&self) {
        let mut inner = self.inner.lock().expect("metrics lock is not poisoned");
        inner.rate_limit_hits = inner.rate_limit_hits.saturating_add(1);
    }

    pub fn record_circuit_open_rejection(&self) {
        let mut inner = self.inner.lock().expect("metrics lock is not poisoned");
        inner.circuit_open_rejections = inner.circuit_open_rejections.saturating_add(1);
    }

    /// Rolling success rate in [0, 1]. Sources with no recorded calls report
    /// 1.0 so fresh registrations start out trusted.
    pub fn success_rate(&self) -> f64 {
        let inner = self.inner.lock().expect("metrics lock is not poisoned");
        if inner.total_calls == 0 {
            1.0
        } else {
            inner.total_successes as f64 / inner.total_calls as f64
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.inner
            .lock()
            .expect("metrics lock is not poisoned")
            .total_calls
    }

    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        let inner = self.inner.lock().expect("metrics lock is not poisoned");
        let success_rate = if inner.total_calls == 0 {
            1.0
        } else {
            inner.total_successes as f64 / inner.total_calls as f64
        };
        let avg_response_time_ms = if inner.total_calls == 0 {
            0.0
        } else {
            inner.total_response_time.as_secs_f64() * 1_000.0 / inner.total_calls as f64
        };

        SourceMetricsSnapshot {
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            success_rate,
            avg_response_time_ms,
            rate_limit_hits: inner.rate_limit_hits,
            circuit_open_rejections: inner.circuit_open_rejections,
            seconds_since_last_success: inner.last_success.map(|at| at.elapsed().as_secs_f64()),
            seconds_since_last_failure: inner.last_failure.map(|at| at.elapsed().as_secs_f64()),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("metrics lock is not poisoned");
        *inner = MetricsInner::default();
    }
}

//! Source adapter contract and the per-source reliability state bundle.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{ReliabilityConfig, SourceConfig};
use crate::error::SourceError;
use crate::listing::NormalizedListing;
use crate::metrics::SourceMetrics;
use crate::rate_limit::TokenBucket;
use crate::source::SourceId;

/// Classified health of a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Health evaluation needs this many recorded calls before success-rate
/// thresholds apply; below it only the breaker state counts.
const MIN_CALLS_FOR_RATE: u64 = 10;

/// Per-source health view for the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealthSnapshot {
    pub source: SourceId,
    pub status: HealthState,
    pub success_rate: f64,
    pub total_calls: u64,
    pub avg_response_time_ms: f64,
    pub circuit_breaker_state: CircuitState,
    pub rate_limit_utilization: f64,
}

/// Everything the reliability pipeline keeps per source: its configuration,
/// circuit breaker, rate limiter, and call metrics. State for one source is
/// never touched while holding another source's locks.
#[derive(Debug)]
pub struct SourceState {
    config: SourceConfig,
    breaker: CircuitBreaker,
    limiter: TokenBucket,
    metrics: SourceMetrics,
}

impl SourceState {
    pub fn new(config: SourceConfig, reliability: &ReliabilityConfig) -> Self {
        let limiter = TokenBucket::per_minute(config.rate_limit_per_minute);
        Self {
            config,
            breaker: CircuitBreaker::new(reliability.circuit_breaker),
            limiter,
            metrics: SourceMetrics::new(),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    pub fn metrics(&self) -> &SourceMetrics {
        &self.metrics
    }

    /// Classify health from breaker state and rolling success rate.
    ///
    /// An open circuit is always unavailable and a half-open one degraded.
    /// Success-rate thresholds (90% healthy, 50% unavailable) only apply
    /// once enough calls have been recorded to make the rate meaningful.
    pub fn health(&self) -> HealthState {
        match self.breaker.state() {
            CircuitState::Open => return HealthState::Unavailable,
            CircuitState::HalfOpen => return HealthState::Degraded,
            CircuitState::Closed => {}
        }

        if self.metrics.total_calls() < MIN_CALLS_FOR_RATE {
            return HealthState::Healthy;
        }

        let rate = self.metrics.success_rate();
        if rate < 0.5 {
            HealthState::Unavailable
        } else if rate < 0.9 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }

    pub fn health_snapshot(&self) -> SourceHealthSnapshot {
        let metrics = self.metrics.snapshot();
        SourceHealthSnapshot {
            source: self.config.source,
            status: self.health(),
            success_rate: metrics.success_rate,
            total_calls: metrics.total_calls,
            avg_response_time_ms: metrics.avg_response_time_ms,
            circuit_breaker_state: self.breaker.state(),
            rate_limit_utilization: self.limiter.snapshot().utilization,
        }
    }
}

/// Contract every marketplace adapter implements.
///
/// `fetch_raw` performs one upstream call and returns the raw records;
/// `normalize` maps those records to the common schema, dropping any it
/// cannot interpret. Reliability concerns (limiter, breaker, retries) live
/// outside the adapter, in the registry's guarded call path.
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    fn state(&self) -> &SourceState;

    fn fetch_raw<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<serde_json::Value>, SourceError>> + Send + 'a>>;

    fn normalize(&self, raw: &[serde_json::Value]) -> Vec<NormalizedListing>;

    fn health(&self) -> HealthState {
        self.state().health()
    }
}

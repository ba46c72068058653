//! Retry orchestration for source calls.
//!
//! Every guarded call passes through the same pipeline: wait for a rate
//! limiter token, ask the circuit breaker for admission, run the attempt
//! under a timeout, then classify the outcome. Retryable failures back off
//! exponentially with jitter; everything else surfaces immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::error::{SourceError, SourceErrorKind};
use crate::metrics::SourceMetrics;
use crate::rate_limit::{RateLimitError, TokenBucket};
use crate::source::SourceId;

/// Exponential backoff schedule with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(32),
            jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying `attempt` (zero-based count of failures so far).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = self.jitter.mul_f64(fastrand::f64());
        exp + jitter
    }
}

/// Retry budget and per-attempt timeout for guarded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt, so `max_retries + 1` attempts total.
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Budget for a single upstream attempt, also the cap on how long the
    /// limiter wait may run before the call is abandoned.
    pub attempt_timeout: Duration,
    /// Minimum pause after the upstream itself reports rate limiting.
    pub rate_limited_floor: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            rate_limited_floor: Duration::from_secs(10),
        }
    }
}

/// Drives a source call through the limiter, breaker, timeout, and retry
/// loop. The controller owns no per-source state; it operates on whatever
/// limiter, breaker, and metrics the caller hands it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with the full reliability pipeline applied.
    ///
    /// Limiter wait timeouts and circuit-open rejections fail fast without
    /// consuming retry budget. A failure that trips the breaker ends the
    /// loop immediately since further attempts would be rejected anyway.
    pub async fn run<T, Op, Fut>(
        &self,
        source: SourceId,
        limiter: &TokenBucket,
        breaker: &CircuitBreaker,
        metrics: &SourceMetrics,
        operation: Op,
    ) -> Result<T, SourceError>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if let Err(error) = limiter.acquire(1.0, self.config.attempt_timeout).await {
                metrics.record_rate_limit_hit();
                let wait = match error {
                    RateLimitError::WouldBlock { wait } | RateLimitError::WaitTimeout { wait } => {
                        wait
                    }
                    RateLimitError::ExceedsCapacity { .. } => Duration::ZERO,
                };
                warn!(source = %source, wait_secs = wait.as_secs_f64(), "rate limit wait exceeds budget");
                return Err(SourceError::rate_limit_wait_timeout(source, wait));
            }

            if let Err(retry_after) = breaker.try_acquire() {
                metrics.record_circuit_open_rejection();
                debug!(source = %source, retry_after_secs = retry_after.as_secs_f64(), "circuit open, rejecting call");
                return Err(SourceError::circuit_open(source, retry_after));
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.config.attempt_timeout, operation()).await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::transient_network(format!(
                    "attempt timed out after {:.0}s",
                    self.config.attempt_timeout.as_secs_f64()
                ))),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(value) => {
                    breaker.record_success();
                    metrics.record_call(elapsed, true);
                    return Ok(value);
                }
                Err(error) => {
                    breaker.record_failure();
                    metrics.record_call(elapsed, false);

                    if !error.retryable() || attempt >= self.config.max_retries {
                        return Err(error);
                    }
                    if breaker.state() == CircuitState::Open {
                        // This failure tripped the breaker; retries would
                        // only bounce off the open circuit.
                        return Err(error);
                    }

                    let mut delay = self.config.backoff.delay_for(attempt);
                    if error.kind() == SourceErrorKind::UpstreamRateLimited {
                        delay = delay.max(self.config.rate_limited_floor);
                    }
                    debug!(
                        source = %source,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "retrying source call"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

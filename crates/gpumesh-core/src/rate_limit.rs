use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Acquisition failure for the token bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitError {
    /// Not enough tokens right now; retry after the contained wait.
    WouldBlock { wait: Duration },
    /// Waiting for tokens exceeded the caller's budget.
    WaitTimeout { wait: Duration },
    /// A request for more tokens than the bucket can ever hold.
    ExceedsCapacity { requested: f64, capacity: f64 },
}

#[derive(Debug)]
struct BucketInner {
    available: f64,
    last_refill: Instant,
    blocked_count: u64,
}

impl BucketInner {
    fn refill(&mut self, capacity: f64, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Point-in-time limiter view for the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub available_tokens: f64,
    pub capacity: f64,
    pub refill_rate: f64,
    pub utilization: f64,
    pub blocked_count: u64,
}

/// Token-bucket rate limiter, one per source.
///
/// Tokens accrue at `refill_rate` per second up to `capacity`. All bucket
/// mutation is serialized under one mutex, so `available` is never observed
/// negative or above capacity.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    inner: Mutex<BucketInner>,
}

impl TokenBucket {
    /// `requests_per_minute` sets both the refill rate and the burst
    /// capacity (one minute's worth), matching the upstream quotas.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self::new(capacity, capacity / 60.0)
    }

    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            inner: Mutex::new(BucketInner {
                available: capacity,
                last_refill: Instant::now(),
                blocked_count: 0,
            }),
        }
    }

    /// Take `tokens` immediately, or report how long the caller would have
    /// to wait for them to accrue.
    pub fn try_acquire(&self, tokens: f64) -> Result<(), RateLimitError> {
        if tokens > self.capacity {
            return Err(RateLimitError::ExceedsCapacity {
                requested: tokens,
                capacity: self.capacity,
            });
        }

        let mut inner = self.inner.lock().expect("token bucket lock is not poisoned");
        inner.refill(self.capacity, self.refill_rate);

        if inner.available >= tokens {
            inner.available -= tokens;
            return Ok(());
        }

        inner.blocked_count = inner.blocked_count.saturating_add(1);
        let wait = Duration::from_secs_f64((tokens - inner.available) / self.refill_rate);
        Err(RateLimitError::WouldBlock { wait })
    }

    /// Acquire `tokens`, sleeping in short slices while they accrue. Fails
    /// with `WaitTimeout` once the remaining wait would exceed `max_wait`.
    pub async fn acquire(&self, tokens: f64, max_wait: Duration) -> Result<(), RateLimitError> {
        let started = Instant::now();

        loop {
            let wait = match self.try_acquire(tokens) {
                Ok(()) => return Ok(()),
                Err(RateLimitError::WouldBlock { wait }) => wait,
                Err(other) => return Err(other),
            };

            if started.elapsed() + wait > max_wait {
                return Err(RateLimitError::WaitTimeout { wait });
            }

            // Short slices keep the wait responsive to refills from elsewhere.
            tokio::time::sleep(wait.min(Duration::from_millis(100))).await;
        }
    }

    /// Estimated wait for `tokens` without consuming anything.
    pub fn wait_hint(&self, tokens: f64) -> Duration {
        let mut inner = self.inner.lock().expect("token bucket lock is not poisoned");
        inner.refill(self.capacity, self.refill_rate);
        if inner.available >= tokens {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((tokens - inner.available) / self.refill_rate)
        }
    }

    /// Restore the bucket to full capacity.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("token bucket lock is not poisoned");
        inner.available = self.capacity;
        inner.last_refill = Instant::now();
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut inner = self.inner.lock().expect("token bucket lock is not poisoned");
        inner.refill(self.capacity, self.refill_rate);
        RateLimiterSnapshot {
            available_tokens: inner.available,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            utilization: 1.0 - inner.available / self.capacity,
            blocked_count: inner.blocked_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_up_to_capacity_then_blocks_with_one_second_hint() {
        let bucket = TokenBucket::new(10.0, 1.0);

        for _ in 0..10 {
            bucket.try_acquire(1.0).expect("burst within capacity");
        }

        let error = bucket.try_acquire(1.0).expect_err("bucket is empty");
        match error {
            RateLimitError::WouldBlock { wait } => {
                assert!(wait > Duration::from_millis(900), "wait = {wait:?}");
                assert!(wait <= Duration::from_millis(1_050), "wait = {wait:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(bucket.snapshot().blocked_count, 1);
    }

    #[test]
    fn tokens_saturate_at_capacity() {
        let bucket = TokenBucket::new(2.0, 1_000.0);
        bucket.try_acquire(2.0).expect("drain");

        std::thread::sleep(Duration::from_millis(20));

        let snapshot = bucket.snapshot();
        assert!(snapshot.available_tokens <= 2.0);
        assert!(snapshot.available_tokens > 1.9);
    }

    #[test]
    fn requesting_more_than_capacity_is_a_configuration_error() {
        let bucket = TokenBucket::new(5.0, 1.0);

        let error = bucket.try_acquire(6.0).expect_err("over capacity");
        assert!(matches!(error, RateLimitError::ExceedsCapacity { .. }));
    }

    #[test]
    fn reset_restores_full_capacity() {
        let bucket = TokenBucket::new(3.0, 0.001);
        bucket.try_acquire(3.0).expect("drain");
        assert!(bucket.try_acquire(1.0).is_err());

        bucket.reset();

        bucket.try_acquire(3.0).expect("full after reset");
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let bucket = TokenBucket::new(1.0, 50.0);
        bucket.try_acquire(1.0).expect("drain");

        bucket
            .acquire(1.0, Duration::from_millis(500))
            .await
            .expect("refill arrives within budget");
    }

    #[tokio::test]
    async fn acquire_times_out_when_wait_exceeds_budget() {
        let bucket = TokenBucket::new(1.0, 0.1);
        bucket.try_acquire(1.0).expect("drain");

        let error = bucket
            .acquire(1.0, Duration::from_millis(10))
            .await
            .expect_err("ten-second refill cannot fit a 10ms budget");
        assert!(matches!(error, RateLimitError::WaitTimeout { .. }));
    }

    #[test]
    fn utilization_reflects_consumption() {
        let bucket = TokenBucket::new(4.0, 0.0001);
        bucket.try_acquire(3.0).expect("consume");

        let snapshot = bucket.snapshot();
        assert!((snapshot.utilization - 0.75).abs() < 0.01);
    }
}

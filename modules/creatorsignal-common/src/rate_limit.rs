// Global token bucket shared by every upstream call.
//
// The bucket refills to capacity on fixed window boundaries, not continuously.
// Callers queue on a fair async mutex, so waiters are released in FIFO order,
// and only the head of the queue ever sleeps on the bucket.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Tokens available per window.
    pub capacity: u32,
    /// Refill interval.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            window: Duration::from_secs(60),
        }
    }
}

struct Bucket {
    available: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    turnstile: tokio::sync::Mutex<()>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity,
            window: config.window,
            turnstile: tokio::sync::Mutex::new(()),
            bucket: Mutex::new(Bucket {
                available: config.capacity,
                window_start: Instant::now(),
            }),
        }
    }

    /// Wait until `n` tokens are available, then take them. Never fails.
    ///
    /// Requests larger than the capacity are clamped to the capacity. A limiter
    /// configured with zero capacity or a zero window passes everything through.
    /// Dropping the returned future while it waits takes no tokens.
    pub async fn acquire(&self, n: u32) {
        if n == 0 || self.capacity == 0 || self.window.is_zero() {
            return;
        }
        let n = n.min(self.capacity);

        let _turn = self.turnstile.lock().await;
        while let Some(wait) = self.try_take(n) {
            debug!(wait_ms = wait.as_millis() as u64, tokens = n, "rate limiter: waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take `n` tokens without waiting. Returns false if the budget is short.
    pub fn try_acquire(&self, n: u32) -> bool {
        if n == 0 || self.capacity == 0 || self.window.is_zero() {
            return true;
        }
        self.try_take(n.min(self.capacity)).is_none()
    }

    /// Tokens left in the current window.
    pub fn available(&self) -> u32 {
        match self.bucket.lock() {
            Ok(mut bucket) => {
                self.refill(&mut bucket, Instant::now());
                bucket.available
            }
            Err(_) => self.capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// `None` when the tokens were taken, otherwise how long until the next refill.
    fn try_take(&self, n: u32) -> Option<Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(b) => b,
            Err(_) => {
                warn!("rate limiter: bucket lock poisoned, passing request through");
                return None;
            }
        };
        let now = Instant::now();
        self.refill(&mut bucket, now);

        if bucket.available >= n {
            bucket.available -= n;
            return None;
        }
        let next_refill = bucket.window_start + self.window;
        Some(next_refill.saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed < self.window {
            return;
        }
        // Snap to the latest boundary at or before `now`, however many windows passed.
        let into_window = elapsed.as_nanos() % self.window.as_nanos();
        let into_window = Duration::from_nanos(u64::try_from(into_window).unwrap_or(u64::MAX));
        bucket.window_start = now.checked_sub(into_window).unwrap_or(now);
        bucket.available = self.capacity;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(capacity: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            capacity,
            window: Duration::from_secs(secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_first_acquire_waits_for_window_refill() {
        let limiter = limiter(30, 60);
        let start = Instant::now();

        for _ in 0..30 {
            limiter.acquire(1).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_secs(59), limiter.acquire(1)).await;
        assert!(blocked.is_err(), "31st acquire resolved before the window refilled");

        limiter.acquire(1).await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(limiter.available(), 29);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_takes_no_tokens() {
        let limiter = limiter(2, 10);
        limiter.acquire(2).await;

        let cancelled = tokio::time::timeout(Duration::from_secs(1), limiter.acquire(1)).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_snaps_to_interval_boundaries() {
        let limiter = limiter(5, 10);
        limiter.acquire(5).await;

        // Two and a half windows later the bucket is full, and the current
        // window ends at t=30s rather than t=35s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(limiter.available(), 5);
        limiter.acquire(5).await;

        let start = Instant::now();
        limiter.acquire(1).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_released_in_request_order() {
        let limiter = Arc::new(limiter(1, 10));
        limiter.acquire(1).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(1).await;
                order.lock().unwrap().push(i);
            }));
            // Let each task reach the queue before spawning the next.
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn oversized_request_is_clamped_and_zero_capacity_passes_through() {
        let small = limiter(3, 60);
        small.acquire(10).await;
        assert_eq!(small.available(), 0);

        let open = limiter(0, 60);
        open.acquire(100).await;
        assert!(open.try_acquire(100));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_after_more_windows_than_fit_in_u32() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1,
            window: Duration::from_micros(1),
        });
        assert!(limiter.try_acquire(1));

        tokio::time::advance(Duration::from_micros((1u64 << 32) + 5)).await;

        // One refill for the current window, then empty until time moves on.
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[tokio::test]
    async fn try_acquire_does_not_wait() {
        let limiter = limiter(2, 60);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }
}

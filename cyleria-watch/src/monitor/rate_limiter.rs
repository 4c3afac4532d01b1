//! Spacing for outbound profile requests.
//!
//! A token bucket shared by the scheduler and the subscription manager. With
//! a capacity of one token it enforces a minimum gap between fetches that
//! holds regardless of whether the previous fetch succeeded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

/// Configuration for a rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens (burst capacity).
    pub max_tokens: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Initial tokens.
    pub initial_tokens: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::spacing(Duration::from_secs(2))
    }
}

impl RateLimiterConfig {
    /// One request per `delay`, no bursts. The first request goes through
    /// immediately. A zero delay disables limiting.
    pub fn spacing(delay: Duration) -> Self {
        let refill_rate = if delay.is_zero() {
            f64::INFINITY
        } else {
            1.0 / delay.as_secs_f64()
        };
        Self {
            max_tokens: 1,
            refill_rate,
            initial_tokens: 1,
        }
    }
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    max_tokens: u32,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            tokens: config.initial_tokens as f64,
            max_tokens: config.max_tokens,
            refill_rate: config.refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Try to take a token without waiting.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.refill_rate)
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = elapsed.as_secs_f64() * self.refill_rate;

        // INFINITY * 0.0 is NaN; treat an unlimited bucket as always full.
        self.tokens = if new_tokens.is_nan() {
            self.max_tokens as f64
        } else {
            (self.tokens + new_tokens).min(self.max_tokens as f64)
        };
        self.last_refill = now;
    }
}

/// Cloneable handle to one limiter shared between tasks.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
}

impl SharedRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiter::new(config))),
        }
    }

    /// Take a token, sleeping until one is available. Returns the time waited.
    ///
    /// # Cancel Safety
    ///
    /// The lock is only held around the synchronous check, never across the
    /// sleep. Dropping the future consumes no token.
    pub async fn acquire(&self) -> Duration {
        let mut total_wait = Duration::ZERO;

        loop {
            let wait = {
                let mut limiter = self.inner.lock().await;
                if limiter.try_acquire() {
                    return total_wait;
                }
                limiter.time_until_available()
            };

            trace!(wait = ?wait, "rate limited");
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }
}

impl Default for SharedRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_allows_one_then_blocks() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::spacing(Duration::from_secs(60)));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(limiter.time_until_available() > Duration::from_secs(50));
    }

    #[test]
    fn test_zero_spacing_never_blocks() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::spacing(Duration::ZERO));
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn test_refill() {
        let mut limiter = RateLimiter::new(RateLimiterConfig {
            max_tokens: 10,
            refill_rate: 100.0,
            initial_tokens: 0,
        });
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_enforces_spacing() {
        let limiter = SharedRateLimiter::new(RateLimiterConfig::spacing(Duration::from_millis(50)));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_acquire_cancel_safe() {
        let limiter = SharedRateLimiter::new(RateLimiterConfig {
            max_tokens: 1,
            refill_rate: 10.0,
            initial_tokens: 0,
        });

        let cloned = limiter.clone();
        let handle = tokio::spawn(async move { cloned.acquire().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        let _ = handle.await;

        let wait = tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(wait.is_ok(), "limiter must stay usable after a cancelled acquire");
    }

    #[tokio::test]
    async fn test_concurrent_acquire() {
        let limiter = SharedRateLimiter::new(RateLimiterConfig {
            max_tokens: 5,
            refill_rate: 100.0,
            initial_tokens: 5,
        });

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let result =
            tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(handles)).await;
        let results = result.expect("concurrent acquires should not deadlock");
        assert!(results.iter().all(|r| r.is_ok()));
    }
}

//! Rate Limiter
//!
//! Keyed token-bucket limiter over an LRU-bounded [`BucketTable`].
//! Every check-and-consume runs under one lock; the lock is never held
//! across an await point.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::config::RateLimitConfig;
use super::store::BucketTable;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::metrics::RATE_LIMIT_DECISIONS_TOTAL;

/// Key used when the caller does not name one
pub const DEFAULT_KEY: &str = "";

/// Floor for a single wait inside [`RateLimiter::acquire`]
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Whole tokens left after this request
    pub remaining: u32,

    /// Time until a token is available (if not allowed)
    pub retry_after: Option<Duration>,

    /// Reason for denial (if not allowed)
    pub reason: Option<String>,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
            reason: None,
        }
    }

    /// Create a denied result
    pub fn denied(remaining: u32, retry_after: Duration, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after: Some(retry_after),
            reason: Some(reason.into()),
        }
    }
}

/// Limiter counters for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterStats {
    pub live_keys: usize,
    pub max_buckets: usize,
    pub allowed_total: u64,
    pub denied_total: u64,
    pub evictions: u64,
}

/// Keyed rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    table: Mutex<BucketTable>,
    clock: Arc<dyn Clock>,
    allowed_total: AtomicU64,
    denied_total: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter on the system clock
    pub fn new(capacity: f64, refill_rate: f64, max_buckets: usize) -> Result<Self> {
        Self::with_clock(capacity, refill_rate, max_buckets, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(
        capacity: f64,
        refill_rate: f64,
        max_buckets: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            table: Mutex::new(BucketTable::new(capacity, refill_rate, max_buckets)?),
            clock,
            allowed_total: AtomicU64::new(0),
            denied_total: AtomicU64::new(0),
        })
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_clock(
            config.capacity,
            config.refill_rate,
            config.max_buckets,
            clock,
        )
    }

    fn lock(&self) -> MutexGuard<'_, BucketTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take one token for `key` if available
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Take one token from the default key
    pub fn allow_default(&self) -> bool {
        self.allow(DEFAULT_KEY)
    }

    /// Take one token for `key`, reporting what is left or how long to wait
    pub fn check(&self, key: &str) -> RateLimitResult {
        let now = self.clock.now();
        let result = {
            let mut table = self.lock();
            match table.touch(key, now) {
                Ok(bucket) => {
                    if bucket.try_acquire(now) {
                        RateLimitResult::allowed(bucket.available(now).floor() as u32)
                    } else {
                        let retry_after = bucket.time_until_available(now);
                        RateLimitResult::denied(0, retry_after, "Rate limit exceeded")
                    }
                }
                // Parameters were validated at construction
                Err(e) => RateLimitResult::denied(0, Duration::ZERO, e.to_string()),
            }
        };

        if result.allowed {
            self.allowed_total.fetch_add(1, Ordering::Relaxed);
            RATE_LIMIT_DECISIONS_TOTAL.with_label_values(&["allowed"]).inc();
        } else {
            self.denied_total.fetch_add(1, Ordering::Relaxed);
            RATE_LIMIT_DECISIONS_TOTAL.with_label_values(&["denied"]).inc();
            tracing::debug!(key, retry_after = ?result.retry_after, "Rate limit exceeded");
        }
        result
    }

    /// Time until `key` has a token; never consumes one
    pub fn retry_after(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let mut table = self.lock();
        table
            .touch(key, now)
            .map(|bucket| bucket.time_until_available(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Time until the default key has a token
    pub fn retry_after_default(&self) -> Duration {
        self.retry_after(DEFAULT_KEY)
    }

    /// Wait for a token for `key`, giving up after `timeout`
    ///
    /// Sleeps exactly until the next token is due, re-checking after every
    /// wake. Dropping the future or hitting the timeout consumes nothing.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for_token(key))
            .await
            .unwrap_or(false)
    }

    async fn wait_for_token(&self, key: &str) -> bool {
        loop {
            let wait = {
                let now = self.clock.now();
                let mut table = self.lock();
                match table.touch(key, now) {
                    Ok(bucket) => {
                        if bucket.try_acquire(now) {
                            None
                        } else {
                            Some(bucket.time_until_available(now))
                        }
                    }
                    Err(_) => return false,
                }
            };

            match wait {
                None => {
                    self.allowed_total.fetch_add(1, Ordering::Relaxed);
                    RATE_LIMIT_DECISIONS_TOTAL.with_label_values(&["allowed"]).inc();
                    return true;
                }
                Some(wait) => tokio::time::sleep(wait.max(MIN_WAIT)).await,
            }
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `key` is tracked (does not refresh its LRU position)
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Current counters
    pub fn stats(&self) -> LimiterStats {
        let table = self.lock();
        LimiterStats {
            live_keys: table.len(),
            max_buckets: table.max_buckets(),
            allowed_total: self.allowed_total.load(Ordering::Relaxed),
            denied_total: self.denied_total.load(Ordering::Relaxed),
            evictions: table.evictions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::GateError;

    fn manual(capacity: f64, rate: f64, max: usize) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(capacity, rate, max, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_limiter_rejects_bad_parameters() {
        assert!(RateLimiter::new(0.0, 1.0, 10).is_err());
        assert!(RateLimiter::new(1.0, 0.0, 10).is_err());
        assert!(RateLimiter::new(1.0, 1.0, 0).is_err());
    }

    #[test]
    fn test_fractional_capacity_fails_at_construction() {
        let clock = Arc::new(ManualClock::new());
        let err = RateLimiter::with_clock(0.5, 1.0, 4, clock).unwrap_err();
        assert!(matches!(err, GateError::InvalidBucket { .. }));
    }

    #[test]
    fn test_extremely_slow_refill_reports_saturated_wait() {
        let (limiter, _clock) = manual(1.0, 1e-20, 4);

        assert!(limiter.allow("k"));
        let result = limiter.check("k");
        assert!(!result.allowed);
        assert_eq!(result.retry_after, Some(Duration::MAX));
        assert_eq!(limiter.retry_after("k"), Duration::MAX);
    }

    #[test]
    fn test_allow_and_retry_after() {
        let (limiter, clock) = manual(1.0, 1.0, 10);

        assert!(limiter.allow("api:moltbook"));
        assert!(!limiter.allow("api:moltbook"));

        let wait = limiter.retry_after("api:moltbook").as_secs_f64();
        assert!(wait > 0.0 && wait <= 1.1);

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("api:moltbook"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = manual(1.0, 1.0, 10);

        assert!(limiter.allow("comment:1"));
        assert!(!limiter.allow("comment:1"));
        assert!(limiter.allow("comment:2"));
    }

    #[test]
    fn test_default_key_is_distinct() {
        let (limiter, _clock) = manual(1.0, 1.0, 10);

        assert!(limiter.allow_default());
        assert!(!limiter.allow_default());
        assert!(limiter.allow("global"));
        assert!(limiter.contains(DEFAULT_KEY));
    }

    #[test]
    fn test_check_reports_remaining() {
        let (limiter, _clock) = manual(3.0, 1.0, 10);

        assert_eq!(limiter.check("k"), RateLimitResult::allowed(2));
        assert_eq!(limiter.check("k"), RateLimitResult::allowed(1));
        assert_eq!(limiter.check("k"), RateLimitResult::allowed(0));

        let denied = limiter.check("k");
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("Rate limit exceeded"));
        assert_eq!(denied.retry_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_after_is_read_only() {
        let (limiter, _clock) = manual(1.0, 1.0, 10);

        for _ in 0..5 {
            assert_eq!(limiter.retry_after("k"), Duration::ZERO);
        }
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_lru_eviction_through_limiter() {
        let (limiter, _clock) = manual(1.0, 1.0, 3);

        limiter.allow("a");
        limiter.allow("b");
        limiter.allow("c");
        limiter.retry_after("a");
        limiter.allow("d");

        assert!(limiter.contains("a"));
        assert!(!limiter.contains("b"));
        assert!(limiter.contains("d"));
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn test_stats() {
        let (limiter, _clock) = manual(1.0, 1.0, 2);

        limiter.allow("a");
        limiter.allow("a");
        limiter.allow("b");
        limiter.allow("c");

        let stats = limiter.stats();
        assert_eq!(stats.live_keys, 2);
        assert_eq!(stats.max_buckets, 2);
        assert_eq!(stats.allowed_total, 3);
        assert_eq!(stats.denied_total, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(1.0, 2.0, 10).unwrap();
        assert!(limiter.allow("k"));

        let start = tokio::time::Instant::now();
        assert!(limiter.acquire("k", Duration::from_secs(5)).await);
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(500), "waited {waited:?}");
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_without_consuming() {
        let limiter = RateLimiter::new(1.0, 0.1, 10).unwrap();
        assert!(limiter.allow("k"));

        assert!(!limiter.acquire("k", Duration::from_secs(1)).await);

        // The token due at 10s is still there once it accrues
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_immediate_when_available() {
        let limiter = RateLimiter::new(2.0, 1.0, 10).unwrap();
        let start = tokio::time::Instant::now();
        assert!(limiter.acquire("k", Duration::from_millis(10)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats().allowed_total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_hands_out_each_token_once() {
        let limiter = Arc::new(RateLimiter::new(1.0, 1.0, 10).unwrap());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                async move { limiter.acquire("shared", Duration::from_millis(2500)).await }
            })
            .collect();
        let results = futures::future::join_all(waiters).await;

        // One token at start plus two refills inside the window
        assert_eq!(results.iter().filter(|ok| **ok).count(), 3);
        assert!(!limiter.allow("shared"));
    }
}

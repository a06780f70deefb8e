//! Social-API Rate Limiter
//!
//! Composes several token buckets and a daily counter into the limits the
//! social network enforces on an agent: a global request budget, spacing
//! between posts, spacing between comments and a cap on comments per UTC
//! day. Posts and comments also spend a request token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use super::bucket::TokenBucket;
use super::config::ApiLimitsConfig;
use super::limiter::RateLimitResult;
use crate::clock::{until_next_utc_midnight, Clock, SystemClock};
use crate::error::Result;

/// Kinds of API traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCategory {
    /// Any API request (reads included)
    Request,
    /// Creating a post
    Post,
    /// Creating a comment
    Comment,
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCategory::Request => write!(f, "request"),
            ApiCategory::Post => write!(f, "post"),
            ApiCategory::Comment => write!(f, "comment"),
        }
    }
}

/// Counter that resets when the UTC date changes
#[derive(Debug, Clone)]
struct DailyCounter {
    day: NaiveDate,
    count: u32,
    limit: u32,
}

impl DailyCounter {
    fn new(limit: u32, today: NaiveDate) -> Self {
        Self {
            day: today,
            count: 0,
            limit,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            self.day = today;
            self.count = 0;
        }
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

#[derive(Debug)]
struct ApiBuckets {
    requests: TokenBucket,
    posts: TokenBucket,
    comments: TokenBucket,
    daily_comments: DailyCounter,
}

/// Composite limiter for social-API traffic
#[derive(Debug)]
pub struct ApiRateLimiter {
    buckets: Mutex<ApiBuckets>,
    clock: Arc<dyn Clock>,
}

impl ApiRateLimiter {
    /// Create a limiter on the system clock
    pub fn new(limits: &ApiLimitsConfig) -> Result<Self> {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(limits: &ApiLimitsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        limits.validate()?;
        let now = clock.now();
        let rpm = f64::from(limits.requests_per_minute);
        let buckets = ApiBuckets {
            requests: TokenBucket::new(rpm, rpm / 60.0, now)?,
            posts: TokenBucket::new(1.0, 1.0 / limits.post_interval().as_secs_f64(), now)?,
            comments: TokenBucket::new(1.0, 1.0 / limits.comment_interval().as_secs_f64(), now)?,
            daily_comments: DailyCounter::new(
                limits.comments_per_day,
                clock.utc_now().date_naive(),
            ),
        };
        Ok(Self {
            buckets: Mutex::new(buckets),
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ApiBuckets> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `category` could proceed now; consumes nothing
    pub fn check(&self, category: ApiCategory) -> RateLimitResult {
        let now = self.clock.now();
        let utc_now = self.clock.utc_now();
        let mut buckets = self.lock();
        evaluate(&mut buckets, category, now, utc_now)
    }

    /// Spend the budget for `category` if every limit it touches allows it
    ///
    /// Either all involved buckets are charged or none are.
    pub fn try_acquire(&self, category: ApiCategory) -> RateLimitResult {
        let now = self.clock.now();
        let utc_now = self.clock.utc_now();
        let mut buckets = self.lock();

        let result = evaluate(&mut buckets, category, now, utc_now);
        if !result.allowed {
            tracing::debug!(%category, reason = ?result.reason, "API rate limit hit");
            return result;
        }

        buckets.requests.try_acquire(now);
        match category {
            ApiCategory::Request => {}
            ApiCategory::Post => {
                buckets.posts.try_acquire(now);
            }
            ApiCategory::Comment => {
                buckets.comments.try_acquire(now);
                buckets.daily_comments.count += 1;
            }
        }
        RateLimitResult::allowed(remaining(&mut buckets, category, now))
    }

    /// Comments still available today
    pub fn comments_left_today(&self) -> u32 {
        let today = self.clock.utc_now().date_naive();
        let mut buckets = self.lock();
        buckets.daily_comments.roll(today);
        buckets.daily_comments.remaining()
    }
}

fn evaluate(
    buckets: &mut ApiBuckets,
    category: ApiCategory,
    now: Instant,
    utc_now: chrono::DateTime<chrono::Utc>,
) -> RateLimitResult {
    let request_wait = buckets.requests.time_until_available(now);
    if request_wait > Duration::ZERO {
        return RateLimitResult::denied(0, request_wait, "Request rate limit exceeded");
    }

    match category {
        ApiCategory::Request => RateLimitResult::allowed(remaining(buckets, category, now)),
        ApiCategory::Post => {
            let wait = buckets.posts.time_until_available(now);
            if wait > Duration::ZERO {
                RateLimitResult::denied(0, wait, "Post interval not yet elapsed")
            } else {
                RateLimitResult::allowed(1)
            }
        }
        ApiCategory::Comment => {
            buckets.daily_comments.roll(utc_now.date_naive());
            if buckets.daily_comments.remaining() == 0 {
                return RateLimitResult::denied(
                    0,
                    until_next_utc_midnight(utc_now),
                    "Daily comment limit reached",
                );
            }
            let wait = buckets.comments.time_until_available(now);
            if wait > Duration::ZERO {
                RateLimitResult::denied(0, wait, "Comment interval not yet elapsed")
            } else {
                RateLimitResult::allowed(buckets.daily_comments.remaining())
            }
        }
    }
}

fn remaining(buckets: &mut ApiBuckets, category: ApiCategory, now: Instant) -> u32 {
    match category {
        ApiCategory::Request => buckets.requests.available(now).floor() as u32,
        ApiCategory::Post => buckets.posts.available(now).floor() as u32,
        ApiCategory::Comment => buckets.daily_comments.remaining(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn limiter(limits: ApiLimitsConfig) -> (ApiRateLimiter, Arc<ManualClock>) {
        let wall = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        let clock = Arc::new(ManualClock::starting_at(wall));
        let limiter = ApiRateLimiter::with_clock(&limits, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let limits = ApiLimitsConfig {
            requests_per_minute: 0,
            ..Default::default()
        };
        assert!(ApiRateLimiter::new(&limits).is_err());
    }

    #[test]
    fn test_post_interval() {
        let (limiter, clock) = limiter(ApiLimitsConfig::default());

        assert!(limiter.try_acquire(ApiCategory::Post).allowed);

        let denied = limiter.try_acquire(ApiCategory::Post);
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("Post interval not yet elapsed"));
        let wait = denied.retry_after.unwrap().as_secs_f64();
        assert!((wait - 1800.0).abs() < 1e-6);

        clock.advance(Duration::from_secs(1801));
        assert!(limiter.try_acquire(ApiCategory::Post).allowed);
    }

    #[test]
    fn test_huge_post_interval_saturates_wait() {
        let (limiter, _clock) = limiter(ApiLimitsConfig {
            post_interval_secs: u64::MAX,
            ..Default::default()
        });

        assert!(limiter.try_acquire(ApiCategory::Post).allowed);
        let denied = limiter.try_acquire(ApiCategory::Post);
        assert!(!denied.allowed);
        assert!(denied.retry_after.unwrap() >= Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn test_check_does_not_consume() {
        let (limiter, _clock) = limiter(ApiLimitsConfig::default());

        for _ in 0..5 {
            assert!(limiter.check(ApiCategory::Post).allowed);
        }
        assert!(limiter.try_acquire(ApiCategory::Post).allowed);
        assert!(!limiter.check(ApiCategory::Post).allowed);
    }

    #[test]
    fn test_request_budget_shared_by_posts() {
        let limits = ApiLimitsConfig {
            requests_per_minute: 2,
            ..Default::default()
        };
        let (limiter, _clock) = limiter(limits);

        assert!(limiter.try_acquire(ApiCategory::Request).allowed);
        assert!(limiter.try_acquire(ApiCategory::Post).allowed);

        let denied = limiter.try_acquire(ApiCategory::Comment);
        assert_eq!(denied.reason.as_deref(), Some("Request rate limit exceeded"));
        // The denied comment charged nothing
        assert_eq!(limiter.comments_left_today(), 50);
    }

    #[test]
    fn test_denied_post_keeps_request_token() {
        let limits = ApiLimitsConfig {
            requests_per_minute: 2,
            ..Default::default()
        };
        let (limiter, _clock) = limiter(limits);

        assert!(limiter.try_acquire(ApiCategory::Post).allowed);
        assert!(!limiter.try_acquire(ApiCategory::Post).allowed);
        assert!(limiter.try_acquire(ApiCategory::Request).allowed);
    }

    #[test]
    fn test_comment_interval_and_daily_limit() {
        let limits = ApiLimitsConfig {
            comments_per_day: 2,
            ..Default::default()
        };
        let (limiter, clock) = limiter(limits);

        let first = limiter.try_acquire(ApiCategory::Comment);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let spaced = limiter.try_acquire(ApiCategory::Comment);
        assert_eq!(spaced.reason.as_deref(), Some("Comment interval not yet elapsed"));

        clock.advance(Duration::from_secs(21));
        assert!(limiter.try_acquire(ApiCategory::Comment).allowed);

        clock.advance(Duration::from_secs(20));
        let capped = limiter.try_acquire(ApiCategory::Comment);
        assert_eq!(capped.reason.as_deref(), Some("Daily comment limit reached"));
        // 23:59:41 UTC, nineteen seconds before the reset
        assert_eq!(capped.retry_after, Some(Duration::from_secs(19)));
    }

    #[test]
    fn test_daily_counter_resets_at_utc_midnight() {
        let limits = ApiLimitsConfig {
            comments_per_day: 1,
            ..Default::default()
        };
        let (limiter, clock) = limiter(limits);

        assert!(limiter.try_acquire(ApiCategory::Comment).allowed);
        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.comments_left_today(), 0);
        assert!(!limiter.try_acquire(ApiCategory::Comment).allowed);

        // Crosses 00:00 UTC
        clock.advance(Duration::from_secs(31));
        assert_eq!(limiter.comments_left_today(), 1);
        assert!(limiter.try_acquire(ApiCategory::Comment).allowed);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ApiCategory::Comment.to_string(), "comment");
        let json = serde_json::to_string(&ApiCategory::Post).unwrap();
        assert_eq!(json, "\"post\"");
    }
}

//! Token Bucket
//!
//! Single-key token bucket with lazy refill. Time is passed in by the
//! caller so the bucket itself never reads a clock.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::clock::{elapsed_since, secs_f64};
use crate::error::{GateError, Result};

/// Token bucket for rate limiting
///
/// Tokens accrue fractionally at `refill_rate` per second up to `capacity`.
/// One whole token is spent per acquisition.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum capacity
    capacity: f64,

    /// Refill rate (tokens per second)
    refill_rate: f64,

    /// Current tokens, always within `0..=capacity`
    tokens: f64,

    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full token bucket
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Result<Self> {
        validate(capacity, refill_rate)?;
        Ok(Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        })
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self, now: Instant) {
        let elapsed = secs_f64(elapsed_since(self.last_refill, now));
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Try to take one token
    ///
    /// On failure only the refill bookkeeping changes.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one token is available, zero if one is available now
    pub fn time_until_available(&mut self, now: Instant) -> Duration {
        self.refill(now);
        self.wait_for_one()
    }

    fn wait_for_one(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            // Saturates for rates too slow to express as a Duration
            Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate)
                .unwrap_or(Duration::MAX)
        }
    }

    /// Current level after refilling, including fractional progress
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Maximum capacity
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate (tokens per second)
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Point-in-time view of the bucket
    pub fn snapshot(&mut self, now: Instant) -> BucketSnapshot {
        self.refill(now);
        BucketSnapshot {
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            tokens: self.tokens,
            retry_after_secs: secs_f64(self.wait_for_one()),
        }
    }
}

/// Serializable view of a bucket for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub capacity: f64,
    pub refill_rate: f64,
    pub tokens: f64,
    pub retry_after_secs: f64,
}

/// Reject non-finite parameters, a capacity that can never hold a whole
/// token, and a non-positive refill rate
pub fn validate(capacity: f64, refill_rate: f64) -> Result<()> {
    let ok = capacity.is_finite()
        && capacity >= 1.0
        && refill_rate.is_finite()
        && refill_rate > 0.0;
    if ok {
        Ok(())
    } else {
        Err(GateError::InvalidBucket {
            capacity,
            refill_rate,
        })
    }
}

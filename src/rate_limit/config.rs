//! Rate Limit Configuration
//!
//! Parameters for the generic keyed limiter and the social-API limiter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::bucket;
use crate::error::{GateError, Result};

/// Default rate limits
pub const DEFAULT_CAPACITY: f64 = 10.0; // burst allowance
pub const DEFAULT_REFILL_RATE: f64 = 1.0; // tokens per second
pub const DEFAULT_MAX_BUCKETS: usize = 10_000; // live keys

/// Generic keyed rate limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size)
    pub capacity: f64,

    /// Tokens added per second
    pub refill_rate: f64,

    /// Maximum number of keys tracked at once
    pub max_buckets: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refill_rate: DEFAULT_REFILL_RATE,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new(capacity: f64, refill_rate: f64, max_buckets: usize) -> Self {
        Self {
            capacity,
            refill_rate,
            max_buckets,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `AGENTGATE_RATE_*` / `AGENTGATE_MAX_BUCKETS` overrides
    ///
    /// Unparseable or out-of-range values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("AGENTGATE_RATE_CAPACITY") {
            if let Ok(capacity) = val.parse::<f64>() {
                if capacity >= 1.0 {
                    self.capacity = capacity;
                }
            }
        }

        if let Ok(val) = std::env::var("AGENTGATE_RATE_REFILL") {
            if let Ok(rate) = val.parse::<f64>() {
                if rate > 0.0 {
                    self.refill_rate = rate;
                }
            }
        }

        if let Ok(val) = std::env::var("AGENTGATE_MAX_BUCKETS") {
            if let Ok(max) = val.parse::<usize>() {
                if max > 0 {
                    self.max_buckets = max;
                }
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        bucket::validate(self.capacity, self.refill_rate)?;
        if self.max_buckets == 0 {
            return Err(GateError::InvalidTableSize);
        }
        Ok(())
    }
}

/// Social-API limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiLimitsConfig {
    /// API requests per minute
    pub requests_per_minute: u32,

    /// Minimum seconds between posts
    pub post_interval_secs: u64,

    /// Minimum seconds between comments
    pub comment_interval_secs: u64,

    /// Comments per UTC day
    pub comments_per_day: u32,
}

impl Default for ApiLimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            post_interval_secs: 30 * 60,
            comment_interval_secs: 20,
            comments_per_day: 50,
        }
    }
}

impl ApiLimitsConfig {
    /// Spacing between posts
    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_secs)
    }

    /// Spacing between comments
    pub fn comment_interval(&self) -> Duration {
        Duration::from_secs(self.comment_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(GateError::Config(
                "api_limits.requests_per_minute must be > 0".to_string(),
            ));
        }
        if self.post_interval_secs == 0 || self.comment_interval_secs == 0 {
            return Err(GateError::Config(
                "api_limits post and comment intervals must be > 0".to_string(),
            ));
        }
        if self.comments_per_day == 0 {
            return Err(GateError::Config(
                "api_limits.comments_per_day must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

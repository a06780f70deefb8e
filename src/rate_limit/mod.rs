//! Rate Limiting Module
//!
//! Keyed token-bucket rate limiting with bounded memory, plus a composite
//! limiter for social-API traffic built from the same primitive.
//!
//! # Features
//!
//! - Token bucket algorithm with fractional, lazy refill
//! - Arbitrary string keys (`"api:moltbook"`, `"comment:<post_id>"`, ...)
//! - LRU eviction keeps the number of live buckets bounded
//! - Cooperative `acquire` that waits exactly until the next token
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RateLimiter                            │
//! │              (Mutex, injected Clock, counters)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │      BucketTable (key → TokenBucket, LRU order)      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod bucket;
pub mod config;
pub mod limiter;
pub mod store;

pub use api::{ApiCategory, ApiRateLimiter};
pub use bucket::{BucketSnapshot, TokenBucket};
pub use config::{ApiLimitsConfig, RateLimitConfig};
pub use limiter::{LimiterStats, RateLimitResult, RateLimiter, DEFAULT_KEY};
pub use store::BucketTable;

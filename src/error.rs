//! Error Types
//!
//! Configuration errors raised while building limiters and permission sets.
//! Policy denials are not errors; see [`crate::permissions::Decision`].

/// Error types for gate construction
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Token bucket parameters out of range
    #[error("Invalid token bucket: capacity {capacity} and refill rate {refill_rate} must be finite, with capacity >= 1 and refill rate > 0")]
    InvalidBucket { capacity: f64, refill_rate: f64 },

    /// Bucket table must hold at least one key
    #[error("Invalid bucket table size: max_buckets must be > 0")]
    InvalidTableSize,

    /// A single permission rule could not be parsed
    #[error("Invalid permission rule for '{action}': {reason}")]
    InvalidRule { action: String, reason: String },

    /// The permission mapping as a whole is malformed
    #[error("Invalid permissions: {0}")]
    InvalidPermissions(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias for gate construction
pub type Result<T> = std::result::Result<T, GateError>;

//! AgentGate Library
//!
//! Gates every action an autonomous agent attempts behind two composable
//! controls: a memory-bounded keyed rate limiter and a per-action
//! permission policy engine (rules, hourly caps, cooldowns, approvals).
//! Both are in-memory and read time through an injectable [`clock::Clock`].

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod permissions;
pub mod rate_limit;

pub use error::{GateError, Result};
pub use permissions::{Decision, Denial, PermissionChecker, PermissionRule, PermissionSet};
pub use rate_limit::{ApiCategory, ApiRateLimiter, RateLimiter};

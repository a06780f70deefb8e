//! Permission Policy Module
//!
//! Per-action business policy for an agent: allow/deny rules, hourly caps,
//! cooldowns and one-shot human approvals. Unknown actions are refused
//! unless a set is built with `default_allowed = true`.
//!
//! Typical use:
//!
//! ```
//! use agentgate::permissions::{PermissionChecker, PermissionRule, PermissionSet};
//!
//! let set = PermissionSet::new(false)
//!     .with_rule(PermissionRule::allow("post").with_max_per_hour(2));
//! let checker = PermissionChecker::new(set);
//!
//! if checker.is_allowed("post") {
//!     // ... perform the post ...
//!     checker.record_action("post");
//! }
//! assert!(!checker.is_allowed("direct_message"));
//! ```

pub mod checker;
pub mod decision;
pub mod rule;

pub use checker::{ActionStats, PermissionChecker};
pub use decision::{Decision, Denial};
pub use rule::{PermissionRule, PermissionSet};

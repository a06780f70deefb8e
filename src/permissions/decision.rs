//! Permission Decisions
//!
//! Outcome of one evaluation. `is_allowed` and `denial_reason` are both
//! read off the same [`Decision`], so they cannot disagree.

use std::fmt;
use std::time::Duration;

use crate::clock::ceil_secs;

/// Why an action was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No rule exists and the default policy is deny
    NoRule { action: String },

    /// A rule exists with `allowed = false`
    Explicit { action: String },

    /// The rule requires approval and none is pending
    ApprovalRequired { action: String },

    /// The last invocation was too recent
    Cooldown { action: String, remaining: Duration },

    /// The hourly cap is used up
    RateLimited {
        action: String,
        count: usize,
        max_per_hour: u32,
    },
}

impl Denial {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Denial::NoRule { .. } => "no_rule",
            Denial::Explicit { .. } => "explicit",
            Denial::ApprovalRequired { .. } => "approval_required",
            Denial::Cooldown { .. } => "cooldown",
            Denial::RateLimited { .. } => "rate_limited",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::NoRule { action } => write!(
                f,
                "Action '{}' has no permission rule and the default policy is deny",
                action
            ),
            Denial::Explicit { action } => {
                write!(f, "Action '{}' is explicitly denied", action)
            }
            Denial::ApprovalRequired { action } => {
                write!(f, "Action '{}' requires human approval", action)
            }
            Denial::Cooldown { action, remaining } => write!(
                f,
                "Cooldown active for '{}': {}s remaining",
                action,
                ceil_secs(*remaining)
            ),
            Denial::RateLimited {
                action,
                count,
                max_per_hour,
            } => write!(
                f,
                "Rate limited: '{}' used {}/{} times in the last hour",
                action, count, max_per_hour
            ),
        }
    }
}

/// Result of evaluating an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed now
    Allowed,

    /// The action is refused for the given reason
    Denied(Denial),
}

impl Decision {
    /// Whether the action may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// The denial, if refused
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Allowed => None,
            Decision::Denied(denial) => Some(denial),
        }
    }

    /// Human-readable reason, if refused
    pub fn reason(&self) -> Option<String> {
        self.denial().map(ToString::to_string)
    }

    /// Short label for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Denied(denial) => denial.kind(),
        }
    }
}

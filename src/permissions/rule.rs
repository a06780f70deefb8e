//! Permission Rules
//!
//! Declarative per-action policy. A permission mapping comes from identity
//! configuration where each action maps to either a boolean shorthand or a
//! rule object:
//!
//! ```toml
//! [identity.permissions]
//! learn = true
//! direct_message = false
//! post = { max_per_hour = 2, cooldown_seconds = 1800 }
//! comment = { requires_approval = true }
//! ```
//!
//! Actions without a rule fall back to the set's default, which is deny
//! unless configured otherwise.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{GateError, Result};

/// Policy for a single action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Action name
    pub action: String,

    /// Whether the action may run at all
    pub allowed: bool,

    /// Invocations per rolling hour (0 = unlimited)
    pub max_per_hour: u32,

    /// Whether each invocation needs a one-shot human approval
    pub requires_approval: bool,

    /// Minimum seconds between invocations (0 = none)
    pub cooldown_seconds: u64,
}

impl PermissionRule {
    /// Allowed with no limits
    pub fn allow(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            allowed: true,
            max_per_hour: 0,
            requires_approval: false,
            cooldown_seconds: 0,
        }
    }

    /// Explicitly denied
    pub fn deny(action: impl Into<String>) -> Self {
        Self {
            allowed: false,
            ..Self::allow(action)
        }
    }

    /// Set the hourly cap
    pub fn with_max_per_hour(mut self, max_per_hour: u32) -> Self {
        self.max_per_hour = max_per_hour;
        self
    }

    /// Set the cooldown
    pub fn with_cooldown(mut self, cooldown_seconds: u64) -> Self {
        self.cooldown_seconds = cooldown_seconds;
        self
    }

    /// Require approval before each invocation
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// Rule object as written in configuration (the action is the map key)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleBody {
    #[serde(default = "default_allowed_field")]
    allowed: bool,
    #[serde(default)]
    max_per_hour: u32,
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    cooldown_seconds: u64,
}

fn default_allowed_field() -> bool {
    true
}

impl RuleBody {
    fn into_rule(self, action: &str) -> PermissionRule {
        PermissionRule {
            action: action.to_string(),
            allowed: self.allowed,
            max_per_hour: self.max_per_hour,
            requires_approval: self.requires_approval,
            cooldown_seconds: self.cooldown_seconds,
        }
    }
}

/// Rules by action name plus the policy for everything else
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    rules: HashMap<String, PermissionRule>,

    /// Policy for actions without a rule; false unless set explicitly
    #[serde(default)]
    default_allowed: bool,
}

impl PermissionSet {
    /// Empty set with the given fallback policy
    pub fn new(default_allowed: bool) -> Self {
        Self {
            rules: HashMap::new(),
            default_allowed,
        }
    }

    /// Parse a configuration mapping of action → bool | rule object
    ///
    /// `null` yields an empty set. Any malformed entry rejects the whole
    /// mapping.
    pub fn from_value(data: &serde_json::Value, default_allowed: bool) -> Result<Self> {
        let mut set = Self::new(default_allowed);
        let entries = match data {
            serde_json::Value::Null => return Ok(set),
            serde_json::Value::Object(entries) => entries,
            other => {
                return Err(GateError::InvalidPermissions(format!(
                    "expected a mapping of action names, got {}",
                    json_kind(other)
                )))
            }
        };

        for (action, value) in entries {
            let rule = match value {
                serde_json::Value::Bool(true) => PermissionRule::allow(action.as_str()),
                serde_json::Value::Bool(false) => PermissionRule::deny(action.as_str()),
                serde_json::Value::Object(_) => RuleBody::deserialize(value)
                    .map_err(|e| GateError::InvalidRule {
                        action: action.clone(),
                        reason: e.to_string(),
                    })?
                    .into_rule(action),
                other => {
                    return Err(GateError::InvalidRule {
                        action: action.clone(),
                        reason: format!("expected a boolean or a rule table, got {}", json_kind(other)),
                    })
                }
            };
            set.insert(rule);
        }

        Ok(set)
    }

    /// Add or replace a rule
    pub fn insert(&mut self, rule: PermissionRule) {
        self.rules.insert(rule.action.clone(), rule);
    }

    /// Builder form of [`PermissionSet::insert`]
    pub fn with_rule(mut self, rule: PermissionRule) -> Self {
        self.insert(rule);
        self
    }

    /// Rule for `action`, if one exists
    pub fn get_rule(&self, action: &str) -> Option<&PermissionRule> {
        self.rules.get(action)
    }

    /// True only when a rule exists and forbids the action
    pub fn is_explicitly_denied(&self, action: &str) -> bool {
        self.rules.get(action).is_some_and(|rule| !rule.allowed)
    }

    /// Policy for actions without a rule
    pub fn default_allowed(&self) -> bool {
        self.default_allowed
    }

    /// Iterate over all rules
    pub fn rules(&self) -> impl Iterator<Item = &PermissionRule> {
        self.rules.values()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a table",
    }
}

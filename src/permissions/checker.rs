//! Permission Checker
//!
//! Stateful gate for one principal. Tracks when each action last ran, how
//! often it ran in the trailing hour and which one-shot approvals are
//! pending, and decides against a [`PermissionSet`].
//!
//! Decision order, first match wins:
//!
//! 1. no rule: the set's default policy
//! 2. rule with `allowed = false`: denied
//! 3. approval required and none pending: denied
//! 4. cooldown not yet elapsed: denied
//! 5. hourly cap reached: denied
//! 6. otherwise allowed

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::decision::{Decision, Denial};
use super::rule::PermissionSet;
use crate::clock::{elapsed_since, Clock, SystemClock, HOUR};
use crate::error::Result;
use crate::metrics::{
    ACTIONS_RECORDED_TOTAL, PERMISSION_DECISIONS_TOTAL, UNRULED_ACTION_LABEL,
};

/// Per-action usage for status output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub actions_this_hour: usize,
    pub max_per_hour: u32,
}

#[derive(Debug, Default)]
struct CheckerState {
    /// Invocation times per action, oldest first
    action_history: HashMap<String, VecDeque<Instant>>,
    last_action_time: HashMap<String, Instant>,
    pending_approvals: HashSet<String>,
}

impl CheckerState {
    fn count_last_hour(&self, action: &str, now: Instant) -> usize {
        self.action_history.get(action).map_or(0, |history| {
            history
                .iter()
                .filter(|t| elapsed_since(**t, now) < HOUR)
                .count()
        })
    }

    fn prune(&mut self, action: &str, now: Instant) {
        if let Some(history) = self.action_history.get_mut(action) {
            while history
                .front()
                .is_some_and(|t| elapsed_since(*t, now) >= HOUR)
            {
                history.pop_front();
            }
        }
    }

    fn record(&mut self, action: &str, now: Instant) {
        self.prune(action, now);
        self.action_history
            .entry(action.to_string())
            .or_default()
            .push_back(now);
        self.last_action_time.insert(action.to_string(), now);
        self.pending_approvals.remove(action);
    }
}

/// Permission gate for one agent
#[derive(Debug)]
pub struct PermissionChecker {
    permissions: PermissionSet,
    state: Mutex<CheckerState>,
    clock: Arc<dyn Clock>,
}

impl PermissionChecker {
    /// Create a checker on the system clock
    pub fn new(permissions: PermissionSet) -> Self {
        Self::with_clock(permissions, Arc::new(SystemClock))
    }

    /// Create a checker reading time from `clock`
    pub fn with_clock(permissions: PermissionSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            permissions,
            state: Mutex::new(CheckerState::default()),
            clock,
        }
    }

    /// Build from an identity configuration's `permissions` entry
    ///
    /// A missing entry gives an empty set, so every action is denied.
    pub fn from_identity(identity: &serde_json::Value) -> Result<Self> {
        Self::from_identity_with_clock(identity, Arc::new(SystemClock))
    }

    /// [`PermissionChecker::from_identity`] with an explicit clock
    pub fn from_identity_with_clock(
        identity: &serde_json::Value,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let permissions = match identity.get("permissions") {
            Some(data) => PermissionSet::from_value(data, false)?,
            None => PermissionSet::default(),
        };
        Ok(Self::with_clock(permissions, clock))
    }

    fn lock(&self) -> MutexGuard<'_, CheckerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The policy this checker enforces
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    fn evaluate(&self, state: &CheckerState, action: &str, now: Instant) -> Decision {
        let Some(rule) = self.permissions.get_rule(action) else {
            return if self.permissions.default_allowed() {
                Decision::Allowed
            } else {
                Decision::Denied(Denial::NoRule {
                    action: action.to_string(),
                })
            };
        };

        if !rule.allowed {
            return Decision::Denied(Denial::Explicit {
                action: action.to_string(),
            });
        }

        if rule.requires_approval && !state.pending_approvals.contains(action) {
            return Decision::Denied(Denial::ApprovalRequired {
                action: action.to_string(),
            });
        }

        if rule.cooldown_seconds > 0 {
            if let Some(last) = state.last_action_time.get(action) {
                let cooldown = Duration::from_secs(rule.cooldown_seconds);
                let elapsed = elapsed_since(*last, now);
                if elapsed < cooldown {
                    return Decision::Denied(Denial::Cooldown {
                        action: action.to_string(),
                        remaining: cooldown - elapsed,
                    });
                }
            }
        }

        if rule.max_per_hour > 0 {
            let count = state.count_last_hour(action, now);
            if count >= rule.max_per_hour as usize {
                return Decision::Denied(Denial::RateLimited {
                    action: action.to_string(),
                    count,
                    max_per_hour: rule.max_per_hour,
                });
            }
        }

        Decision::Allowed
    }

    /// Evaluate `action` now without changing any state
    pub fn check(&self, action: &str) -> Decision {
        let now = self.clock.now();
        let decision = {
            let state = self.lock();
            self.evaluate(&state, action, now)
        };

        PERMISSION_DECISIONS_TOTAL
            .with_label_values(&[decision.outcome()])
            .inc();
        if let Decision::Denied(denial) = &decision {
            tracing::debug!(action, reason = %denial, "Action denied");
        }
        decision
    }

    /// Whether `action` may proceed now
    pub fn is_allowed(&self, action: &str) -> bool {
        self.check(action).is_allowed()
    }

    /// Why `action` is refused now, or `None` if it is allowed
    pub fn denial_reason(&self, action: &str) -> Option<String> {
        self.check(action).reason()
    }

    /// Note that `action` has just executed
    ///
    /// Consumes a pending approval for the action, if any.
    pub fn record_action(&self, action: &str) {
        let now = self.clock.now();
        self.lock().record(action, now);
        self.count_recorded(action);
        tracing::trace!(action, "Recorded action");
    }

    /// Check and record in one step
    ///
    /// For callers on preemptive threads: nothing can slip in between the
    /// decision and the bookkeeping. The caller must still run the action.
    pub fn try_record(&self, action: &str) -> Decision {
        let now = self.clock.now();
        let decision = {
            let mut state = self.lock();
            let decision = self.evaluate(&state, action, now);
            if decision.is_allowed() {
                state.record(action, now);
            }
            decision
        };

        PERMISSION_DECISIONS_TOTAL
            .with_label_values(&[decision.outcome()])
            .inc();
        if decision.is_allowed() {
            self.count_recorded(action);
        }
        decision
    }

    // Label cardinality stays bounded by the rule set
    fn count_recorded(&self, action: &str) {
        let label = if self.permissions.get_rule(action).is_some() {
            action
        } else {
            UNRULED_ACTION_LABEL
        };
        ACTIONS_RECORDED_TOTAL.with_label_values(&[label]).inc();
    }

    /// Grant a one-shot approval for `action`
    pub fn grant_approval(&self, action: &str) {
        let inserted = self.lock().pending_approvals.insert(action.to_string());
        if inserted {
            tracing::info!(action, "Approval granted");
        }
    }

    /// Withdraw a pending approval; returns whether one was pending
    pub fn revoke_approval(&self, action: &str) -> bool {
        self.lock().pending_approvals.remove(action)
    }

    /// Actions with a pending approval, sorted
    pub fn pending_approvals(&self) -> BTreeSet<String> {
        self.lock().pending_approvals.iter().cloned().collect()
    }

    /// Usage in the trailing hour for every ruled or recorded action
    pub fn get_stats(&self) -> BTreeMap<String, ActionStats> {
        let now = self.clock.now();
        let state = self.lock();

        let mut stats: BTreeMap<String, ActionStats> = self
            .permissions
            .rules()
            .map(|rule| {
                (
                    rule.action.clone(),
                    ActionStats {
                        actions_this_hour: state.count_last_hour(&rule.action, now),
                        max_per_hour: rule.max_per_hour,
                    },
                )
            })
            .collect();

        for action in state.action_history.keys() {
            stats.entry(action.clone()).or_insert_with(|| ActionStats {
                actions_this_hour: state.count_last_hour(action, now),
                max_per_hour: 0,
            });
        }

        stats
    }
}

//! Typed status condition set (spec.md §3 "Account (observed)").
//!
//! Mirrors the Kubernetes `metav1.Condition` convention used throughout the
//! reference operators in the pack (e.g. octopilot-secret-manager-controller's
//! `Condition`), keyed by `type` with at most one entry per type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TYPE_READY: &str = "Ready";

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_ERRORED: &str = "Errored";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub observed_generation: i64,
}

/// Insert-or-replace a condition by `type`, bumping `last_transition_time`
/// only when `status` actually changes (matches the common kube-rs
/// `set_condition` helper seen across the reference operators).
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    observed_generation: i64,
) {
    let message = message.into();
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Utc::now();
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message;
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message,
            last_transition_time: Utc::now(),
            observed_generation,
        });
    }
}

pub fn is_ready(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == TYPE_READY && c.status == ConditionStatus::True)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_replaces_in_place() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::False,
            REASON_RECONCILING,
            "Deleting",
            1,
        );
        assert_eq!(conditions.len(), 1);
        set_condition(
            &mut conditions,
            TYPE_READY,
            ConditionStatus::True,
            REASON_RECONCILED,
            "",
            1,
        );
        assert_eq!(conditions.len(), 1);
        assert!(is_ready(&conditions));
    }
}

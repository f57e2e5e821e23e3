//! Plan computation: desired vs. observed state.

use std::fmt;

use serde::Serialize;

use crate::types::{Dimension, ETag, PolicyConfig, PolicyId, StoredPolicy};

/// A top-level policy attribute that can drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyField {
    Name,
    Comment,
    Dimension(Dimension),
}

impl fmt::Display for PolicyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Comment => write!(f, "comment"),
            Self::Dimension(dimension) => write!(f, "{dimension}"),
        }
    }
}

/// The remote operation needed to converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Nothing exists yet.
    Create(PolicyConfig),
    /// The stored policy differs from desired state.
    Update {
        id: PolicyId,
        etag: ETag,
        config: PolicyConfig,
        changed: Vec<PolicyField>,
    },
    /// Explicit removal.
    Delete { id: PolicyId, etag: ETag },
    /// Already converged.
    NoOp,
}

/// Plan kind without payload, for logging and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
    Delete,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

impl Plan {
    /// The kind of operation this plan performs.
    #[must_use]
    pub const fn action(&self) -> PlanAction {
        match self {
            Self::Create(_) => PlanAction::Create,
            Self::Update { .. } => PlanAction::Update,
            Self::Delete { .. } => PlanAction::Delete,
            Self::NoOp => PlanAction::NoOp,
        }
    }

    /// Whether applying this plan issues a remote mutation.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

/// Fields on which two configs differ. Item lists compare as sets.
#[must_use]
pub fn diff(desired: &PolicyConfig, current: &PolicyConfig) -> Vec<PolicyField> {
    let mut changed = Vec::new();
    if desired.name != current.name {
        changed.push(PolicyField::Name);
    }
    if desired.comment != current.comment {
        changed.push(PolicyField::Comment);
    }
    for dimension in Dimension::ALL {
        if desired.forwarding(dimension) != current.forwarding(dimension) {
            changed.push(PolicyField::Dimension(dimension));
        }
    }
    changed
}

/// Compute the operation that makes `current` match `desired`.
///
/// Never yields `Delete`; removal is only planned through [`plan_delete`].
#[must_use]
pub fn reconcile(desired: &PolicyConfig, current: Option<&StoredPolicy>) -> Plan {
    let Some(current) = current else {
        return Plan::Create(desired.clone());
    };

    let changed = diff(desired, &current.config);
    if changed.is_empty() {
        Plan::NoOp
    } else {
        Plan::Update {
            id: current.id.clone(),
            etag: current.etag.clone(),
            config: desired.clone(),
            changed,
        }
    }
}

/// Plan explicit removal of a policy.
#[must_use]
pub fn plan_delete(current: Option<&StoredPolicy>) -> Plan {
    current.map_or(Plan::NoOp, |current| Plan::Delete {
        id: current.id.clone(),
        etag: current.etag.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Forwarding;

    fn desired() -> PolicyConfig {
        PolicyConfig::new("p1")
            .with_comment("test comment")
            .with_cookies(Forwarding::whitelist(["test"]))
            .with_headers(Forwarding::whitelist(["test"]))
            .with_query_strings(Forwarding::whitelist(["test"]))
    }

    fn stored(config: PolicyConfig) -> StoredPolicy {
        StoredPolicy {
            id: PolicyId::new("id-1"),
            etag: ETag::new("E1"),
            last_modified: None,
            config,
        }
    }

    #[test]
    fn absent_current_plans_create() {
        assert_eq!(reconcile(&desired(), None), Plan::Create(desired()));
    }

    #[test]
    fn equal_current_plans_noop() {
        let current = stored(desired());
        assert_eq!(reconcile(&desired(), Some(&current)), Plan::NoOp);
    }

    #[test]
    fn item_order_does_not_cause_update() {
        let a = desired().with_headers(Forwarding::whitelist(["x", "y"]));
        let b = desired().with_headers(Forwarding::whitelist(["y", "x"]));
        assert_eq!(reconcile(&a, Some(&stored(b))), Plan::NoOp);
    }

    #[test]
    fn drift_plans_update_with_observed_etag() {
        let target = desired()
            .with_comment("test comment updated")
            .with_headers(Forwarding::None)
            .with_cookies(Forwarding::whitelist(["test2"]))
            .with_query_strings(Forwarding::whitelist(["test2"]));
        let plan = reconcile(&target, Some(&stored(desired())));
        assert_eq!(
            plan,
            Plan::Update {
                id: PolicyId::new("id-1"),
                etag: ETag::new("E1"),
                config: target,
                changed: vec![
                    PolicyField::Comment,
                    PolicyField::Dimension(Dimension::Cookies),
                    PolicyField::Dimension(Dimension::Headers),
                    PolicyField::Dimension(Dimension::QueryStrings),
                ],
            }
        );
    }

    #[test]
    fn rename_is_an_update() {
        let target = PolicyConfig {
            name: "p1-renamed".into(),
            ..desired()
        };
        let plan = reconcile(&target, Some(&stored(desired())));
        assert_eq!(plan.action(), PlanAction::Update);
        assert!(matches!(plan, Plan::Update { changed, .. } if changed == vec![PolicyField::Name]));
    }

    #[test]
    fn delete_only_on_explicit_intent() {
        let current = stored(desired());
        assert_eq!(
            plan_delete(Some(&current)),
            Plan::Delete {
                id: PolicyId::new("id-1"),
                etag: ETag::new("E1")
            }
        );
        assert_eq!(plan_delete(None), Plan::NoOp);
    }

    #[test]
    fn field_display() {
        assert_eq!(PolicyField::Dimension(Dimension::Headers).to_string(), "headers_config");
        assert_eq!(PlanAction::NoOp.to_string(), "no-op");
    }
}

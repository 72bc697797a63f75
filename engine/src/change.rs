//! Change state tracked per entity.
//!
//! Every entity is classified relative to the last known server state. An
//! entity with no entry in a [`ChangeStateMap`] is `Unchanged`.

use crate::{Entity, EntityKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relationship of an entity to the last known server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Matches the server
    #[default]
    Unchanged,
    /// Created locally, unknown to the server
    Added,
    /// Edited locally
    Updated,
    /// Deleted locally (tombstone)
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Unchanged => write!(f, "unchanged"),
            ChangeType::Added => write!(f, "added"),
            ChangeType::Updated => write!(f, "updated"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

/// Tracked change for one entity.
///
/// `original_value` holds the last known server value and is present only
/// for `Updated` and `Deleted` entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeState {
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<Entity>,
}

impl ChangeState {
    pub fn added() -> Self {
        Self {
            change_type: ChangeType::Added,
            original_value: None,
        }
    }

    pub fn updated(original: Entity) -> Self {
        Self {
            change_type: ChangeType::Updated,
            original_value: Some(original),
        }
    }

    pub fn deleted(original: Entity) -> Self {
        Self {
            change_type: ChangeType::Deleted,
            original_value: Some(original),
        }
    }

    /// Whether this entry records a pending local change.
    pub fn is_tracked(&self) -> bool {
        self.change_type != ChangeType::Unchanged
    }
}

/// Tracked changes keyed by entity key.
pub type ChangeStateMap = BTreeMap<EntityKey, ChangeState>;

/// Current entity values keyed by entity key.
pub type EntityMap = BTreeMap<EntityKey, Entity>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_is_unchanged() {
        let state = ChangeState::default();
        assert_eq!(state.change_type, ChangeType::Unchanged);
        assert!(state.original_value.is_none());
        assert!(!state.is_tracked());
    }

    #[test]
    fn constructors_uphold_original_invariant() {
        assert!(ChangeState::added().original_value.is_none());
        assert_eq!(
            ChangeState::updated(json!({"id": 1})).original_value,
            Some(json!({"id": 1}))
        );
        assert_eq!(
            ChangeState::deleted(json!({"id": 2})).change_type,
            ChangeType::Deleted
        );
    }

    #[test]
    fn change_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ChangeType::Updated).unwrap(),
            json!("updated")
        );
        let parsed: ChangeType = serde_json::from_value(json!("deleted")).unwrap();
        assert_eq!(parsed, ChangeType::Deleted);
        assert_eq!(ChangeType::Added.to_string(), "added");
    }

    #[test]
    fn change_state_omits_missing_original() {
        let json = serde_json::to_value(ChangeState::added()).unwrap();
        assert_eq!(json, json!({"changeType": "added"}));
    }
}

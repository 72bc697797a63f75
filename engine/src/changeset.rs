//! Changesets sent to the server.
//!
//! A changeset batches every pending change of a collection into at most one
//! item per operation kind.

use crate::{ChangeType, Entity, EntityCollection, EntityKey, EntityName, EntityUpdate};
use serde::{Deserialize, Serialize};

/// One batch of same-kind changes for an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ChangeSetItem {
    #[serde(rename_all = "camelCase")]
    Add {
        entity_name: EntityName,
        entities: Vec<Entity>,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        entity_name: EntityName,
        entities: Vec<EntityUpdate>,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        entity_name: EntityName,
        entities: Vec<EntityKey>,
    },
}

impl ChangeSetItem {
    /// Number of entities in this item.
    pub fn len(&self) -> usize {
        match self {
            ChangeSetItem::Add { entities, .. } => entities.len(),
            ChangeSetItem::Update { entities, .. } => entities.len(),
            ChangeSetItem::Delete { entities, .. } => entities.len(),
        }
    }

    /// Whether this item carries no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of changes to save in one server exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<ChangeSetItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ChangeSet {
    /// Build the minimal changeset for a collection's pending changes.
    ///
    /// Added entities are sent whole, updated entities as the fields that
    /// differ from their original, deleted entities by key.
    pub fn from_snapshot(entity_name: &str, snapshot: &EntityCollection) -> Self {
        let mut adds = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();

        for (key, change) in &snapshot.change_state {
            match change.change_type {
                ChangeType::Unchanged => {}
                ChangeType::Added => {
                    if let Some(entity) = snapshot.entity(key) {
                        adds.push(entity.clone());
                    }
                }
                ChangeType::Updated => {
                    if let Some(entity) = snapshot.entity(key) {
                        let changes = match &change.original_value {
                            Some(original) => diff_fields(original, entity),
                            None => entity.clone(),
                        };
                        if changes.as_object().is_some_and(|c| !c.is_empty()) {
                            updates.push(EntityUpdate::new(key.clone(), changes));
                        }
                    }
                }
                ChangeType::Deleted => deletes.push(key.clone()),
            }
        }

        let entity_name = entity_name.to_string();
        let items = [
            ChangeSetItem::Add {
                entity_name: entity_name.clone(),
                entities: adds,
            },
            ChangeSetItem::Update {
                entity_name: entity_name.clone(),
                entities: updates,
            },
            ChangeSetItem::Delete {
                entity_name,
                entities: deletes,
            },
        ];

        Self {
            changes: items.into_iter().filter(|i| !i.is_empty()).collect(),
            tag: None,
        }
    }

    /// Attach a caller-defined tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Fields of `current` that differ from `original`.
///
/// Fields removed since `original` are reported as `null`.
pub fn diff_fields(original: &Entity, current: &Entity) -> Entity {
    let mut changes = serde_json::Map::new();
    let empty = serde_json::Map::new();
    let original = original.as_object().unwrap_or(&empty);
    let current = current.as_object().unwrap_or(&empty);

    for (field, value) in current {
        if original.get(field) != Some(value) {
            changes.insert(field.clone(), value.clone());
        }
    }
    for field in original.keys() {
        if !current.contains_key(field) {
            changes.insert(field.clone(), serde_json::Value::Null);
        }
    }

    serde_json::Value::Object(changes)
}

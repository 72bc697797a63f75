//! Snapshot of one entity collection.
//!
//! The state container owns the canonical entity and change-state maps. It
//! hands this engine a snapshot per operation and commits the result back.
//! Uses BTreeMap so iteration order is deterministic.

use crate::{
    error::Result, ChangeState, ChangeStateMap, ChangeType, DurableRecord, Entity, EntityKey,
    EntityMap, WriteOutcome,
};

/// Entity values and their tracked changes for one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCollection {
    /// Current entity values (tombstoned entities are absent)
    pub entities: EntityMap,
    /// Tracked changes; a missing entry means `Unchanged`
    pub change_state: ChangeStateMap,
}

impl EntityCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection of unchanged entities.
    pub fn from_entities(key_field: &str, entities: impl IntoIterator<Item = Entity>) -> Result<Self> {
        let mut collection = Self::new();
        for entity in entities {
            let key = EntityKey::of(&entity, key_field)?;
            collection.entities.insert(key, entity);
        }
        Ok(collection)
    }

    /// Rebuild entities and change state from durable records.
    ///
    /// Tombstones only contribute change state; every other record
    /// contributes its stripped value.
    pub fn from_records(
        key_field: &str,
        records: impl IntoIterator<Item = DurableRecord>,
    ) -> Result<Self> {
        let mut collection = Self::new();
        for record in records {
            let key = EntityKey::of(&record.value, key_field)?;
            let change = record.change_state();
            if change.change_type != ChangeType::Deleted {
                collection.entities.insert(key.clone(), record.value);
            }
            if change.is_tracked() {
                collection.change_state.insert(key, change);
            }
        }
        Ok(collection)
    }

    /// Get the current value of an entity.
    pub fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Get the change type of an entity (`Unchanged` when untracked).
    pub fn change_type(&self, key: &EntityKey) -> ChangeType {
        self.change_state
            .get(key)
            .map(|c| c.change_type)
            .unwrap_or_default()
    }

    /// Get the tracked original value of an entity.
    pub fn original(&self, key: &EntityKey) -> Option<&Entity> {
        self.change_state
            .get(key)
            .and_then(|c| c.original_value.as_ref())
    }

    /// Commit a classifier result.
    pub fn apply_write(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Put(write) => {
                match write.change_type {
                    ChangeType::Deleted => {
                        self.entities.remove(&write.key);
                    }
                    _ => {
                        self.entities.insert(write.key.clone(), write.value.clone());
                    }
                }
                self.set_change(write.key.clone(), write.change_state());
            }
            WriteOutcome::Remove(key) => {
                self.entities.remove(key);
                self.change_state.remove(key);
            }
        }
    }

    /// Keys with a pending local change.
    pub fn tracked_keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.change_state
            .iter()
            .filter(|(_, c)| c.is_tracked())
            .map(|(k, _)| k)
    }

    /// Count of pending local changes.
    pub fn pending_count(&self) -> usize {
        self.tracked_keys().count()
    }

    /// Set the change state of a key, removing the entry when untracked.
    pub(crate) fn set_change(&mut self, key: EntityKey, change: ChangeState) {
        if change.is_tracked() {
            self.change_state.insert(key, change);
        } else {
            self.change_state.remove(&key);
        }
    }
}

//! Reconciliation of server results with locally tracked changes.
//!
//! When a server round trip returns authoritative data, a [`MergeStrategy`]
//! decides per key whether the server value or the pending local value wins,
//! and whether the tracked change is cleared or rewritten.
//!
//! The classifier guarantees that `Updated` and `Deleted` entries carry the
//! last known server value, so every merge here works without refetching.

use crate::{
    classify::overlay, error::Result, ChangeState, ChangeType, Entity, EntityCollection,
    EntityKey, EntityUpdate,
};
use serde::{Deserialize, Serialize};

/// Merge strategy for server results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Apply server values, leave tracked changes as they are
    IgnoreChanges,
    /// Keep pending local values, rebase their original on the server value
    PreserveChanges,
    /// Apply server values and discard tracked changes
    OverwriteChanges,
}

/// Keys touched by a merge, by what happened to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Server value written to the entity map
    pub upserted: Vec<EntityKey>,
    /// Local value kept, original rebased
    pub preserved: Vec<EntityKey>,
    /// Tracked change cleared
    pub committed: Vec<EntityKey>,
    /// Removed from the entity map
    pub removed: Vec<EntityKey>,
}

/// Applies server results and undo/commit requests to a collection snapshot.
pub struct Reconciler<'a> {
    key_field: &'a str,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler for a collection keyed by `key_field`.
    pub fn new(key_field: &'a str) -> Self {
        Self { key_field }
    }

    /// Merge entities returned by a query. Defaults to `PreserveChanges`.
    pub fn merge_query_results(
        &self,
        collection: &mut EntityCollection,
        entities: Vec<Entity>,
        strategy: Option<MergeStrategy>,
    ) -> Result<MergeReport> {
        self.merge_server_upserts(
            collection,
            entities,
            strategy.unwrap_or(MergeStrategy::PreserveChanges),
        )
    }

    /// Merge entities the server confirmed as added. Defaults to `OverwriteChanges`.
    pub fn merge_save_adds(
        &self,
        collection: &mut EntityCollection,
        entities: Vec<Entity>,
        strategy: Option<MergeStrategy>,
    ) -> Result<MergeReport> {
        self.merge_server_upserts(
            collection,
            entities,
            strategy.unwrap_or(MergeStrategy::OverwriteChanges),
        )
    }

    /// Merge entities the server confirmed as upserted. Defaults to `OverwriteChanges`.
    pub fn merge_save_upserts(
        &self,
        collection: &mut EntityCollection,
        entities: Vec<Entity>,
        strategy: Option<MergeStrategy>,
    ) -> Result<MergeReport> {
        self.merge_server_upserts(
            collection,
            entities,
            strategy.unwrap_or(MergeStrategy::OverwriteChanges),
        )
    }

    /// Merge updates the server confirmed. Defaults to `OverwriteChanges`.
    ///
    /// Updates for keys missing from the entity map are ignored.
    pub fn merge_save_updates(
        &self,
        collection: &mut EntityCollection,
        updates: Vec<EntityUpdate>,
        strategy: Option<MergeStrategy>,
    ) -> MergeReport {
        let strategy = strategy.unwrap_or(MergeStrategy::OverwriteChanges);
        let mut report = MergeReport::default();

        for update in updates {
            let key = update.id;
            let tracked = collection.change_type(&key);

            if strategy == MergeStrategy::PreserveChanges && tracked != ChangeType::Unchanged {
                let base = collection
                    .original(&key)
                    .or_else(|| collection.entity(&key))
                    .cloned();
                if let Some(base) = base {
                    let server = self.with_key(overlay([&base, &update.changes]), &key);
                    rebase(collection, key.clone(), tracked, server);
                    report.preserved.push(key);
                }
                continue;
            }

            if let Some(current) = collection.entity(&key) {
                let merged = self.with_key(overlay([current, &update.changes]), &key);
                collection.entities.insert(key.clone(), merged);
                report.upserted.push(key.clone());
            }
            if strategy == MergeStrategy::OverwriteChanges && collection.change_state.remove(&key).is_some() {
                report.committed.push(key);
            }
        }

        report
    }

    /// Merge keys the server confirmed as deleted. Defaults to `OverwriteChanges`.
    ///
    /// Every strategy except `IgnoreChanges` clears the tracked change.
    pub fn merge_save_deletes(
        &self,
        collection: &mut EntityCollection,
        keys: Vec<EntityKey>,
        strategy: Option<MergeStrategy>,
    ) -> MergeReport {
        let strategy = strategy.unwrap_or(MergeStrategy::OverwriteChanges);
        let mut report = MergeReport::default();

        for key in keys {
            if strategy != MergeStrategy::IgnoreChanges && collection.change_state.remove(&key).is_some() {
                report.committed.push(key.clone());
            }
            if collection.entities.remove(&key).is_some() {
                report.removed.push(key);
            }
        }

        report
    }

    /// Revert every tracked change to its last known server value.
    pub fn undo_all(&self, collection: &mut EntityCollection) -> MergeReport {
        let keys: Vec<_> = collection.change_state.keys().cloned().collect();
        self.undo_many(collection, keys)
    }

    /// Revert the tracked changes of `keys`.
    ///
    /// Added entities are removed; updated and deleted entities get their
    /// original value back.
    pub fn undo_many(
        &self,
        collection: &mut EntityCollection,
        keys: impl IntoIterator<Item = EntityKey>,
    ) -> MergeReport {
        let mut report = MergeReport::default();

        for key in keys {
            let Some(change) = collection.change_state.remove(&key) else {
                continue;
            };
            match change.change_type {
                ChangeType::Unchanged => {}
                ChangeType::Added => {
                    collection.entities.remove(&key);
                    report.removed.push(key.clone());
                }
                ChangeType::Updated | ChangeType::Deleted => {
                    if let Some(original) = change.original_value {
                        collection.entities.insert(key.clone(), original);
                        report.upserted.push(key.clone());
                    }
                }
            }
            report.committed.push(key);
        }

        report
    }

    /// Accept every tracked change as the new server state.
    pub fn commit_all(&self, collection: &mut EntityCollection) -> MergeReport {
        let keys: Vec<_> = collection.change_state.keys().cloned().collect();
        self.commit_many(collection, keys)
    }

    /// Accept the tracked changes of `keys`, keeping current values.
    pub fn commit_many(
        &self,
        collection: &mut EntityCollection,
        keys: impl IntoIterator<Item = EntityKey>,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        for key in keys {
            if collection.change_state.remove(&key).is_some() {
                report.committed.push(key);
            }
        }
        report
    }

    fn merge_server_upserts(
        &self,
        collection: &mut EntityCollection,
        entities: Vec<Entity>,
        strategy: MergeStrategy,
    ) -> Result<MergeReport> {
        let mut report = MergeReport::default();

        // Resolve every key first so a bad entity leaves the collection untouched.
        let keyed = entities
            .into_iter()
            .map(|entity| EntityKey::of(&entity, self.key_field).map(|key| (key, entity)))
            .collect::<Result<Vec<_>>>()?;

        for (key, server) in keyed {
            let tracked = collection.change_type(&key);
            match strategy {
                MergeStrategy::PreserveChanges if tracked != ChangeType::Unchanged => {
                    rebase(collection, key.clone(), tracked, server);
                    report.preserved.push(key);
                }
                MergeStrategy::OverwriteChanges => {
                    collection.entities.insert(key.clone(), server);
                    report.upserted.push(key.clone());
                    if collection.change_state.remove(&key).is_some() {
                        report.committed.push(key);
                    }
                }
                _ => {
                    collection.entities.insert(key.clone(), server);
                    report.upserted.push(key);
                }
            }
        }

        Ok(report)
    }

    fn with_key(&self, mut entity: Entity, key: &EntityKey) -> Entity {
        if let Some(obj) = entity.as_object_mut() {
            obj.insert(self.key_field.to_string(), key.to_value());
        }
        entity
    }
}

/// Replace the original of a tracked change with a new server value.
///
/// An `Added` entity the server now knows about becomes `Updated`.
fn rebase(collection: &mut EntityCollection, key: EntityKey, tracked: ChangeType, server: Entity) {
    let change = match tracked {
        ChangeType::Deleted => ChangeState::deleted(server),
        ChangeType::Added | ChangeType::Updated | ChangeType::Unchanged => {
            ChangeState::updated(server)
        }
    };
    collection.set_change(key, change);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracked_collection() -> EntityCollection {
        let mut collection = EntityCollection::new();
        collection
            .entities
            .insert(EntityKey::Int(1), json!({"id": 1, "name": "Added"}));
        collection
            .entities
            .insert(EntityKey::Int(2), json!({"id": 2, "name": "Local"}));
        collection
            .entities
            .insert(EntityKey::Int(5), json!({"id": 5, "name": "Plain"}));
        collection
            .change_state
            .insert(EntityKey::Int(1), ChangeState::added());
        collection.change_state.insert(
            EntityKey::Int(2),
            ChangeState::updated(json!({"id": 2, "name": "Server"})),
        );
        collection.change_state.insert(
            EntityKey::Int(3),
            ChangeState::deleted(json!({"id": 3, "name": "Gone"})),
        );
        collection
    }

    #[test]
    fn query_results_preserve_local_changes_by_default() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id")
            .merge_query_results(
                &mut collection,
                vec![
                    json!({"id": 2, "name": "Server2"}),
                    json!({"id": 3, "name": "Gone2"}),
                    json!({"id": 5, "name": "Plain2"}),
                ],
                None,
            )
            .unwrap();

        assert_eq!(report.preserved, vec![EntityKey::Int(2), EntityKey::Int(3)]);
        assert_eq!(report.upserted, vec![EntityKey::Int(5)]);

        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Local"}))
        );
        assert_eq!(
            collection.original(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Server2"}))
        );
        assert!(collection.entity(&EntityKey::Int(3)).is_none());
        assert_eq!(collection.change_type(&EntityKey::Int(3)), ChangeType::Deleted);
        assert_eq!(
            collection.entity(&EntityKey::Int(5)),
            Some(&json!({"id": 5, "name": "Plain2"}))
        );
    }

    #[test]
    fn preserved_add_becomes_update() {
        let mut collection = tracked_collection();
        Reconciler::new("id")
            .merge_query_results(
                &mut collection,
                vec![json!({"id": 1, "name": "FromServer"})],
                Some(MergeStrategy::PreserveChanges),
            )
            .unwrap();

        assert_eq!(collection.change_type(&EntityKey::Int(1)), ChangeType::Updated);
        assert_eq!(
            collection.entity(&EntityKey::Int(1)),
            Some(&json!({"id": 1, "name": "Added"}))
        );
    }

    #[test]
    fn save_adds_overwrite_by_default() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id")
            .merge_save_adds(
                &mut collection,
                vec![json!({"id": 1, "name": "Added", "createdBy": "server"})],
                None,
            )
            .unwrap();

        assert_eq!(report.committed, vec![EntityKey::Int(1)]);
        assert_eq!(collection.change_type(&EntityKey::Int(1)), ChangeType::Unchanged);
        assert_eq!(
            collection.entity(&EntityKey::Int(1)).unwrap()["createdBy"],
            "server"
        );
    }

    #[test]
    fn ignore_changes_keeps_tracking() {
        let mut collection = tracked_collection();
        Reconciler::new("id")
            .merge_query_results(
                &mut collection,
                vec![json!({"id": 2, "name": "Server2"})],
                Some(MergeStrategy::IgnoreChanges),
            )
            .unwrap();

        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Server2"}))
        );
        assert_eq!(collection.change_type(&EntityKey::Int(2)), ChangeType::Updated);
    }

    #[test]
    fn bad_server_entity_leaves_collection_untouched() {
        let mut collection = tracked_collection();
        let before = collection.clone();
        let result = Reconciler::new("id").merge_query_results(
            &mut collection,
            vec![json!({"id": 5, "name": "x"}), json!({"name": "keyless"})],
            None,
        );

        assert!(result.is_err());
        assert_eq!(collection, before);
    }

    #[test]
    fn save_updates_overwrite() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id").merge_save_updates(
            &mut collection,
            vec![EntityUpdate::new(2, json!({"version": 7}))],
            None,
        );

        assert_eq!(report.upserted, vec![EntityKey::Int(2)]);
        assert_eq!(report.committed, vec![EntityKey::Int(2)]);
        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Local", "version": 7}))
        );
        assert_eq!(collection.change_type(&EntityKey::Int(2)), ChangeType::Unchanged);
    }

    #[test]
    fn save_updates_preserve_rebases_original() {
        let mut collection = tracked_collection();
        Reconciler::new("id").merge_save_updates(
            &mut collection,
            vec![EntityUpdate::new(2, json!({"version": 7}))],
            Some(MergeStrategy::PreserveChanges),
        );

        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Local"}))
        );
        assert_eq!(
            collection.original(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Server", "version": 7}))
        );
    }

    #[test]
    fn save_deletes_clear_tracking() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id").merge_save_deletes(
            &mut collection,
            vec![EntityKey::Int(3), EntityKey::Int(5)],
            None,
        );

        assert_eq!(report.committed, vec![EntityKey::Int(3)]);
        assert_eq!(report.removed, vec![EntityKey::Int(5)]);
        assert!(!collection.change_state.contains_key(&EntityKey::Int(3)));
    }

    #[test]
    fn save_deletes_ignore_keeps_tracking() {
        let mut collection = tracked_collection();
        Reconciler::new("id").merge_save_deletes(
            &mut collection,
            vec![EntityKey::Int(3)],
            Some(MergeStrategy::IgnoreChanges),
        );
        assert_eq!(collection.change_type(&EntityKey::Int(3)), ChangeType::Deleted);
    }

    #[test]
    fn undo_all_restores_originals() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id").undo_all(&mut collection);

        assert_eq!(report.removed, vec![EntityKey::Int(1)]);
        assert_eq!(report.upserted, vec![EntityKey::Int(2), EntityKey::Int(3)]);
        assert!(collection.change_state.is_empty());
        assert!(collection.entity(&EntityKey::Int(1)).is_none());
        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Server"}))
        );
        assert_eq!(
            collection.entity(&EntityKey::Int(3)),
            Some(&json!({"id": 3, "name": "Gone"}))
        );
    }

    #[test]
    fn commit_keeps_current_values() {
        let mut collection = tracked_collection();
        let report = Reconciler::new("id").commit_many(&mut collection, [EntityKey::Int(2)]);

        assert_eq!(report.committed, vec![EntityKey::Int(2)]);
        assert_eq!(
            collection.entity(&EntityKey::Int(2)),
            Some(&json!({"id": 2, "name": "Local"}))
        );
        assert_eq!(collection.pending_count(), 2);

        Reconciler::new("id").commit_all(&mut collection);
        assert_eq!(collection.pending_count(), 0);
    }
}

//! Integration tests for offline collection services.
//!
//! The state container is played by the tests: they hand each operation a
//! snapshot, either built by hand or restored from the durable store.

use serde_json::json;
use std::path::Path;
use tether_engine::{
    ChangeSet, ChangeType, CollectionSchema, EntityCollection, EntityKey, EntityUpdate, Error,
    Reconciler, CHANGE_TYPE_TAG, ORIGINAL_VALUE_TAG,
};
use tether_offline::{delete_store, ConfigError, OfflineConfig, OfflineError, OfflineServiceFactory};

fn factory(dir: &Path, version: u32) -> OfflineServiceFactory {
    OfflineServiceFactory::new(
        OfflineConfig::new(dir, "heroes", version)
            .with_collection(CollectionSchema::new("Hero"))
            .with_collection(CollectionSchema::new("Villain").with_key_path("uuid")),
    )
}

fn server_heroes() -> EntityCollection {
    EntityCollection::from_entities(
        "id",
        vec![
            json!({"id": 1, "name": "A"}),
            json!({"id": 2, "name": "B"}),
            json!({"id": 4, "name": "Pre"}),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn update_returns_entity_without_tags() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    let update = EntityUpdate::from_value(&json!({"id": 1, "changes": {"name": "B"}})).unwrap();
    let entity = heroes.update(&server_heroes(), &update).await.unwrap();
    assert_eq!(entity, json!({"id": 1, "name": "B"}));

    let record = heroes.record(&EntityKey::Int(1)).await.unwrap().unwrap();
    assert_eq!(record.change_type, ChangeType::Updated);
    assert_eq!(record.original_value, Some(json!({"id": 1, "name": "A"})));
    factory.close().await;
}

#[tokio::test]
async fn add_is_stored_as_added() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    let entity = heroes.add(json!({"id": 7, "name": "Seven"})).await.unwrap();
    assert_eq!(entity, json!({"id": 7, "name": "Seven"}));
    assert!(entity.get(CHANGE_TYPE_TAG).is_none());

    let record = heroes.record(&EntityKey::Int(7)).await.unwrap().unwrap();
    assert_eq!(record.to_value()[CHANGE_TYPE_TAG], "added");
    assert!(record.to_value().get(ORIGINAL_VALUE_TAG).is_none());
    factory.close().await;
}

#[tokio::test]
async fn add_without_entity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    let result = heroes.add(serde_json::Value::Null).await;
    assert!(matches!(
        result,
        Err(OfflineError::Service(Error::InvalidOperation(m))) if m == "No entity to add"
    ));
    factory.close().await;
}

#[tokio::test]
async fn delete_of_added_entity_leaves_no_record() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    heroes.add(json!({"id": 7, "name": "Seven"})).await.unwrap();
    let snapshot = heroes.restore().await.unwrap();
    assert_eq!(snapshot.change_type(&EntityKey::Int(7)), ChangeType::Added);

    let key = heroes.delete(&snapshot, &EntityKey::Int(7)).await.unwrap();
    assert_eq!(key, EntityKey::Int(7));
    assert!(heroes.record(&EntityKey::Int(7)).await.unwrap().is_none());
    factory.close().await;
}

#[tokio::test]
async fn delete_keeps_original_for_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    let key = heroes
        .delete(&server_heroes(), &EntityKey::Int(2))
        .await
        .unwrap();
    assert_eq!(key, EntityKey::Int(2));

    let record = heroes.record(&key).await.unwrap().unwrap();
    assert_eq!(record.change_type, ChangeType::Deleted);
    assert_eq!(record.original_value, Some(json!({"id": 2, "name": "B"})));

    // Undo recovers the pre-delete value verbatim
    let mut restored = heroes.restore().await.unwrap();
    Reconciler::new("id").undo_all(&mut restored);
    assert_eq!(restored.entity(&key), Some(&json!({"id": 2, "name": "B"})));
    factory.close().await;
}

#[tokio::test]
async fn edits_of_deleted_entity_never_write() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    heroes
        .delete(&server_heroes(), &EntityKey::Int(1))
        .await
        .unwrap();
    let snapshot = heroes.restore().await.unwrap();
    let before = heroes.record(&EntityKey::Int(1)).await.unwrap();

    for _ in 0..2 {
        let result = heroes
            .update(&snapshot, &EntityUpdate::new(1, json!({"name": "Z"})))
            .await;
        assert!(matches!(
            result,
            Err(OfflineError::Service(Error::Domain(m))) if m == "cannot update deleted entity"
        ));

        let result = heroes.upsert(&snapshot, &json!({"id": 1, "name": "Z"})).await;
        assert!(matches!(
            result,
            Err(OfflineError::Service(Error::Domain(m))) if m == "cannot upsert deleted entity"
        ));

        assert_eq!(heroes.record(&EntityKey::Int(1)).await.unwrap(), before);
    }
    factory.close().await;
}

#[tokio::test]
async fn upsert_over_local_update() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    heroes
        .update(&server_heroes(), &EntityUpdate::new(4, json!({"name": "Local"})))
        .await
        .unwrap();
    let snapshot = heroes.restore().await.unwrap();

    let entity = heroes
        .upsert(&snapshot, &json!({"id": 4, "name": "New"}))
        .await
        .unwrap();
    assert_eq!(entity, json!({"id": 4, "name": "New"}));

    let record = heroes.record(&EntityKey::Int(4)).await.unwrap().unwrap();
    assert_eq!(record.change_type, ChangeType::Updated);
    assert_eq!(record.original_value, Some(json!({"id": 4, "name": "Pre"})));
    factory.close().await;
}

#[tokio::test]
async fn pending_changes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let factory = factory(dir.path(), 1);
        let heroes = factory.create("Hero").unwrap();
        let server = server_heroes();

        heroes.add(json!({"id": 9, "name": "Nine"})).await.unwrap();
        heroes
            .update(&server, &EntityUpdate::new(1, json!({"name": "A2"})))
            .await
            .unwrap();
        heroes.delete(&server, &EntityKey::Int(2)).await.unwrap();
        factory.close().await;
    }

    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();
    let restored = heroes.restore().await.unwrap();

    assert_eq!(restored.pending_count(), 3);
    assert_eq!(restored.change_type(&EntityKey::Int(9)), ChangeType::Added);
    assert_eq!(
        restored.entity(&EntityKey::Int(1)),
        Some(&json!({"id": 1, "name": "A2"}))
    );
    assert!(restored.entity(&EntityKey::Int(2)).is_none());

    let changeset = ChangeSet::from_snapshot("Hero", &restored);
    assert_eq!(changeset.changes.len(), 3);
    factory.close().await;
}

#[tokio::test]
async fn collections_are_isolated_and_keyed_by_config() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();
    let villains = factory.create("Villain").unwrap();
    assert_eq!(villains.key_field(), "uuid");

    villains
        .add(json!({"uuid": "v-1", "name": "Joker"}))
        .await
        .unwrap();
    let missing_key = villains.add(json!({"id": 1, "name": "Keyless"})).await;
    assert!(matches!(
        missing_key,
        Err(OfflineError::Service(Error::InvalidOperation(_)))
    ));

    assert!(heroes.restore().await.unwrap().entities.is_empty());
    assert_eq!(villains.restore().await.unwrap().entities.len(), 1);
    factory.close().await;
}

#[tokio::test]
async fn unknown_entity_type_fails_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);

    let result = factory.create("Sidekick");
    assert!(matches!(
        result,
        Err(OfflineError::Config(ConfigError::UnknownEntity(e))) if e == "Sidekick"
    ));
}

#[tokio::test]
async fn reads_are_not_served() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    assert!(matches!(
        heroes.get_all().await,
        Err(OfflineError::Unsupported("getAll"))
    ));
    assert!(matches!(
        heroes.get_by_id(&EntityKey::Int(1)).await,
        Err(OfflineError::Unsupported("getById"))
    ));
    assert!(matches!(
        heroes.get_with_query(&json!({"name": "A"})).await,
        Err(OfflineError::Unsupported("getWithQuery"))
    ));
}

#[tokio::test]
async fn blocked_upgrade_surfaces_on_first_operation() {
    let dir = tempfile::tempdir().unwrap();

    let current = factory(dir.path(), 1);
    let heroes_v1 = current.create("Hero").unwrap();
    heroes_v1.add(json!({"id": 1, "name": "A"})).await.unwrap();

    let upgraded = factory(dir.path(), 2);
    let heroes_v2 = upgraded.create("Hero").unwrap();
    for _ in 0..2 {
        let result = heroes_v2.add(json!({"id": 2, "name": "B"})).await;
        assert!(matches!(result, Err(OfflineError::Blocked { .. })));
    }

    // The old connection still works and nothing was written by the new one
    let snapshot = heroes_v1.restore().await.unwrap();
    assert_eq!(snapshot.entities.len(), 1);

    current.close().await;

    let entity = heroes_v2.add(json!({"id": 2, "name": "B"})).await.unwrap();
    assert_eq!(entity, json!({"id": 2, "name": "B"}));
    upgraded.close().await;
}

#[tokio::test]
async fn close_releases_the_store_and_reopens_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(dir.path(), 1);
    let heroes = factory.create("Hero").unwrap();

    heroes.add(json!({"id": 1, "name": "A"})).await.unwrap();
    assert!(factory.store().is_open().await);

    factory.close().await;
    assert!(!factory.store().is_open().await);
    assert!(delete_store(dir.path(), "heroes").await);

    // The same service keeps working against a fresh store
    let entity = heroes.add(json!({"id": 2, "name": "B"})).await.unwrap();
    assert_eq!(entity, json!({"id": 2, "name": "B"}));
    assert!(heroes.record(&EntityKey::Int(1)).await.unwrap().is_none());
    assert!(factory.store().is_open().await);
    factory.close().await;
}

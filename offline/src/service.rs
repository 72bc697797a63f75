//! Offline collection services.
//!
//! Each service handles one entity type. An operation takes the caller's
//! snapshot of the collection, classifies the change, writes the resulting
//! record through the durable store and returns the bare entity.
//!
//! All services built by one [`OfflineServiceFactory`] share a single store
//! connection, opened on first use.

use crate::config::OfflineConfig;
use crate::db::DurableStore;
use crate::error::{OfflineError, Result};
use std::sync::Arc;
use tether_engine::{
    Classifier, DurableRecord, Entity, EntityCollection, EntityKey, EntityName, EntityUpdate,
    WriteOutcome,
};
use tokio::sync::Mutex;

/// Lazily opened store shared between services.
///
/// Closing releases the connection and its lock; the next [`StoreHandle::get`]
/// opens the store again.
#[derive(Debug)]
pub struct StoreHandle {
    config: Arc<OfflineConfig>,
    store: Mutex<Option<Arc<DurableStore>>>,
}

impl StoreHandle {
    /// Create a handle; nothing is opened yet.
    pub fn new(config: Arc<OfflineConfig>) -> Self {
        Self {
            config,
            store: Mutex::new(None),
        }
    }

    /// Get the open store, opening it on first use.
    ///
    /// A failed open is not cached; the next call tries again.
    pub async fn get(&self) -> Result<Arc<DurableStore>> {
        let mut slot = self.store.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }

        let store = Arc::new(DurableStore::open(&self.config).await?);
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Whether the store is currently open.
    pub async fn is_open(&self) -> bool {
        self.store.lock().await.is_some()
    }

    /// Close the shared connection if it was opened.
    ///
    /// Operations still in flight keep their connection until they finish;
    /// the lock is released with the last of them.
    pub async fn close(&self) {
        let Some(store) = self.store.lock().await.take() else {
            return;
        };
        match Arc::try_unwrap(store) {
            Ok(store) => store.close().await,
            Err(store) => {
                store.pool.close().await;
                tracing::debug!(store = %store.name(), "Closed shared offline store");
            }
        }
    }
}

/// Builds offline services for configured entity types.
#[derive(Debug, Clone)]
pub struct OfflineServiceFactory {
    config: Arc<OfflineConfig>,
    store: Arc<StoreHandle>,
}

impl OfflineServiceFactory {
    /// Create a factory for `config`.
    pub fn new(config: OfflineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            store: Arc::new(StoreHandle::new(config.clone())),
            config,
        }
    }

    /// Create the service for `entity_name`.
    ///
    /// Fails immediately when the entity type has no configured collection.
    pub fn create(&self, entity_name: &str) -> Result<OfflineCollectionService> {
        let key_field = self.config.key_path(entity_name)?.to_string();
        Ok(OfflineCollectionService {
            entity_name: entity_name.to_string(),
            key_field,
            store: self.store.clone(),
        })
    }

    /// Configuration the factory was built with.
    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// The shared store handle.
    pub fn store(&self) -> &Arc<StoreHandle> {
        &self.store
    }

    /// Close the shared connection.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Offline CRUD for one entity type.
#[derive(Debug, Clone)]
pub struct OfflineCollectionService {
    entity_name: EntityName,
    key_field: String,
    store: Arc<StoreHandle>,
}

impl OfflineCollectionService {
    /// Entity type this service handles.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Field holding the entity key.
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Record a locally added entity.
    pub async fn add(&self, entity: Entity) -> Result<Entity> {
        let empty = EntityCollection::new();
        let write = Classifier::new(&self.key_field, &empty).add(&entity)?;
        self.persist_entity(WriteOutcome::Put(write)).await
    }

    /// Record a local delete and return the key.
    ///
    /// An entity that was only ever added locally is removed outright.
    pub async fn delete(&self, snapshot: &EntityCollection, key: &EntityKey) -> Result<EntityKey> {
        let outcome = Classifier::new(&self.key_field, snapshot).delete(key)?;
        self.persist(outcome).await?;
        Ok(key.clone())
    }

    /// Record a local partial update and return the merged entity.
    pub async fn update(&self, snapshot: &EntityCollection, update: &EntityUpdate) -> Result<Entity> {
        let write = Classifier::new(&self.key_field, snapshot).update(update)?;
        self.persist_entity(WriteOutcome::Put(write)).await
    }

    /// Record a local upsert and return the merged entity.
    pub async fn upsert(&self, snapshot: &EntityCollection, entity: &Entity) -> Result<Entity> {
        let write = Classifier::new(&self.key_field, snapshot).upsert(entity)?;
        self.persist_entity(WriteOutcome::Put(write)).await
    }

    /// Reads are served by the in-memory store, not the offline store.
    pub async fn get_all(&self) -> Result<Vec<Entity>> {
        Err(OfflineError::Unsupported("getAll"))
    }

    /// Reads are served by the in-memory store, not the offline store.
    pub async fn get_by_id(&self, _key: &EntityKey) -> Result<Entity> {
        Err(OfflineError::Unsupported("getById"))
    }

    /// Reads are served by the in-memory store, not the offline store.
    pub async fn get_with_query(&self, _params: &serde_json::Value) -> Result<Vec<Entity>> {
        Err(OfflineError::Unsupported("getWithQuery"))
    }

    /// Rebuild this collection's entities and change state from the store.
    pub async fn restore(&self) -> Result<EntityCollection> {
        let records = self.records().await?;
        let snapshot = EntityCollection::from_records(&self.key_field, records)?;

        tracing::info!(
            entity = %self.entity_name,
            entities = snapshot.entities.len(),
            pending = snapshot.pending_count(),
            "Restored offline collection"
        );
        Ok(snapshot)
    }

    /// Every raw durable record of this collection, ordered by key.
    pub async fn records(&self) -> Result<Vec<DurableRecord>> {
        let store = self.store.get().await?;
        store.get_all(&self.entity_name).await
    }

    /// Raw durable record for `key`, tags included.
    pub async fn record(&self, key: &EntityKey) -> Result<Option<DurableRecord>> {
        let store = self.store.get().await?;
        store.get(&self.entity_name, key).await
    }

    async fn persist_entity(&self, outcome: WriteOutcome) -> Result<Entity> {
        let key = outcome.key().clone();
        self.persist(outcome)
            .await?
            .ok_or(OfflineError::Service(tether_engine::Error::EntityNotFound(key)))
    }

    /// Write a classified outcome; returns the stored entity without tags.
    async fn persist(&self, outcome: WriteOutcome) -> Result<Option<Entity>> {
        let store = self.store.get().await?;

        let result = match outcome {
            WriteOutcome::Put(write) => store
                .put(&self.entity_name, &write.key, DurableRecord::from(&write))
                .await
                .map(|record| Some(record.into_entity())),
            WriteOutcome::Remove(key) => store
                .delete(&self.entity_name, &key)
                .await
                .map(|_| None),
        };

        if let Err(e) = &result {
            tracing::error!(entity = %self.entity_name, error = %e, "Offline write failed");
        }
        result
    }
}

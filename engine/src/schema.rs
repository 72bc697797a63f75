//! Collection schema for the durable store.
//!
//! A schema names the durable collections (one per entity type), the field
//! each collection is keyed by, and the version that drives migrations.

use crate::{error::Result, key::DEFAULT_KEY_PATH, EntityName, Error, StoreVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Entity type name, also the durable collection name
    pub name: EntityName,
    /// Field holding the entity key
    pub key_path: String,
}

impl CollectionSchema {
    /// Create a collection keyed by `id`.
    pub fn new(name: impl Into<EntityName>) -> Self {
        Self {
            name: name.into(),
            key_path: DEFAULT_KEY_PATH.to_string(),
        }
    }

    /// Use a different key field.
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }
}

/// Schema for the entire durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema version for migrations
    pub version: StoreVersion,
    /// Collection schemas by name
    pub collections: BTreeMap<EntityName, CollectionSchema>,
}

impl Schema {
    /// Create a new schema.
    pub fn new(version: StoreVersion) -> Self {
        Self {
            version,
            collections: BTreeMap::new(),
        }
    }

    /// Add a collection to the schema.
    pub fn add_collection(&mut self, collection: CollectionSchema) -> &mut Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }

    /// Builder-style method to add a collection.
    pub fn with_collection(mut self, collection: CollectionSchema) -> Self {
        self.add_collection(collection);
        self
    }

    /// Get a collection schema by name.
    pub fn get_collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Get a collection schema, failing for unknown names.
    pub fn require_collection(&self, name: &str) -> Result<&CollectionSchema> {
        self.get_collection(name)
            .ok_or_else(|| Error::UnknownCollection(name.to_string()))
    }

    /// Names of all configured collections, in order.
    pub fn collection_names(&self) -> impl Iterator<Item = &EntityName> {
        self.collections.keys()
    }
}

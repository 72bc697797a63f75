//! Operation types for expressing local changes.
//!
//! Changes are expressed as operations, not direct mutations, so that the
//! classifier can decide how each one folds into the tracked state.

use crate::{error::Result, Entity, EntityKey, Error};
use serde::{Deserialize, Serialize};

/// A partial update addressed to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    /// Key of the entity to update
    pub id: EntityKey,
    /// Fields to overlay onto the entity
    pub changes: Entity,
}

impl EntityUpdate {
    /// Create a new update.
    pub fn new(id: impl Into<EntityKey>, changes: Entity) -> Self {
        Self {
            id: id.into(),
            changes,
        }
    }

    /// Parse an update from its JSON form `{ "id": .., "changes": {..} }`.
    ///
    /// A missing or null `id` is an invalid operation.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidOperation("update must be an object".into()))?;

        let id = EntityKey::from_value(obj.get("id").unwrap_or(&serde_json::Value::Null))?;
        let changes = obj
            .get("changes")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        Ok(Self { id, changes })
    }
}

/// A local operation against an entity collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "lowercase")]
pub enum EntityOp {
    Add(Entity),
    Delete(EntityKey),
    Update(EntityUpdate),
    Upsert(Entity),
}

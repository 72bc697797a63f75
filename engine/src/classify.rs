//! Change classification.
//!
//! Given the tracked state of a key and an incoming local operation, the
//! classifier computes what must be written: the new value, its change type
//! and the original value to keep. It performs no I/O.
//!
//! # Transitions
//!
//! | current   | delete            | update / upsert                        |
//! |-----------|-------------------|----------------------------------------|
//! | Unchanged | tombstone         | `current ⊕ incoming`, original = current |
//! | Added     | physical removal  | `current ⊕ incoming`, stays Added      |
//! | Updated   | tombstone         | `original ⊕ current ⊕ incoming`        |
//! | Deleted   | tombstone (again) | domain error                           |
//!
//! `⊕` is a shallow field overlay where the right-hand side wins.

use crate::{
    error::Result, ChangeState, ChangeType, Entity, EntityCollection, EntityKey, EntityOp,
    EntityUpdate, Error,
};

/// The value, change type and original value to persist for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteTuple {
    pub key: EntityKey,
    pub value: Entity,
    pub change_type: ChangeType,
    pub original_value: Option<Entity>,
}

impl WriteTuple {
    /// Change state this write leaves behind.
    pub fn change_state(&self) -> ChangeState {
        ChangeState {
            change_type: self.change_type,
            original_value: self.original_value.clone(),
        }
    }
}

/// What the durable store has to do for one classified operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Upsert a tagged record
    Put(WriteTuple),
    /// Physically remove the record
    Remove(EntityKey),
}

impl WriteOutcome {
    /// Key this outcome applies to.
    pub fn key(&self) -> &EntityKey {
        match self {
            WriteOutcome::Put(write) => &write.key,
            WriteOutcome::Remove(key) => key,
        }
    }
}

/// Shallow overlay of entity layers, later layers winning per field.
///
/// Non-object layers contribute nothing.
pub fn overlay<'a>(layers: impl IntoIterator<Item = &'a Entity>) -> Entity {
    let mut merged = serde_json::Map::new();
    for layer in layers {
        if let Some(obj) = layer.as_object() {
            for (field, value) in obj {
                merged.insert(field.clone(), value.clone());
            }
        }
    }
    serde_json::Value::Object(merged)
}

/// Classifies local operations against one collection snapshot.
pub struct Classifier<'a> {
    key_field: &'a str,
    snapshot: &'a EntityCollection,
}

impl<'a> Classifier<'a> {
    /// Create a classifier reading keys from `key_field`.
    pub fn new(key_field: &'a str, snapshot: &'a EntityCollection) -> Self {
        Self {
            key_field,
            snapshot,
        }
    }

    /// Classify any operation.
    pub fn classify(&self, op: &EntityOp) -> Result<WriteOutcome> {
        match op {
            EntityOp::Add(entity) => self.add(entity).map(WriteOutcome::Put),
            EntityOp::Delete(key) => self.delete(key),
            EntityOp::Update(update) => self.update(update).map(WriteOutcome::Put),
            EntityOp::Upsert(entity) => self.upsert(entity).map(WriteOutcome::Put),
        }
    }

    /// Classify an add. The tracked state of the key is not consulted.
    pub fn add(&self, entity: &Entity) -> Result<WriteTuple> {
        if entity.is_null() {
            return Err(Error::InvalidOperation("No entity to add".into()));
        }
        let key = self.key_of(entity)?;

        Ok(WriteTuple {
            key,
            value: entity.clone(),
            change_type: ChangeType::Added,
            original_value: None,
        })
    }

    /// Classify a delete.
    pub fn delete(&self, key: &EntityKey) -> Result<WriteOutcome> {
        let current = self.snapshot.entity(key);

        let original = match self.snapshot.change_type(key) {
            ChangeType::Added => return Ok(WriteOutcome::Remove(key.clone())),
            ChangeType::Unchanged => current,
            ChangeType::Updated | ChangeType::Deleted => self.snapshot.original(key).or(current),
        };
        let original = original
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(key.clone()))?;

        Ok(WriteOutcome::Put(WriteTuple {
            key: key.clone(),
            value: original.clone(),
            change_type: ChangeType::Deleted,
            original_value: Some(original),
        }))
    }

    /// Classify a partial update.
    pub fn update(&self, update: &EntityUpdate) -> Result<WriteTuple> {
        if !update.changes.is_object() {
            return Err(Error::InvalidOperation(
                "update changes must be an object".into(),
            ));
        }
        if let Some(changed_key) = update.changes.get(self.key_field) {
            if EntityKey::from_value(changed_key).ok().as_ref() != Some(&update.id) {
                return Err(Error::InvalidOperation(format!(
                    "update of {} cannot change its key",
                    update.id
                )));
            }
        }

        if self.snapshot.change_type(&update.id) == ChangeType::Unchanged
            && self.snapshot.entity(&update.id).is_none()
        {
            return Err(Error::EntityNotFound(update.id.clone()));
        }

        self.merge(&update.id, &update.changes, "cannot update deleted entity")
    }

    /// Classify an upsert.
    ///
    /// An upsert of an untracked key that is not in the snapshot is an add.
    pub fn upsert(&self, entity: &Entity) -> Result<WriteTuple> {
        if entity.is_null() {
            return Err(Error::InvalidOperation("No entity to upsert".into()));
        }
        let key = self.key_of(entity)?;

        if self.snapshot.change_type(&key) == ChangeType::Unchanged
            && self.snapshot.entity(&key).is_none()
        {
            return Ok(WriteTuple {
                key,
                value: entity.clone(),
                change_type: ChangeType::Added,
                original_value: None,
            });
        }

        self.merge(&key, entity, "cannot upsert deleted entity")
    }

    fn merge(&self, key: &EntityKey, incoming: &Entity, deleted_message: &str) -> Result<WriteTuple> {
        let current = self.snapshot.entity(key);

        let (mut value, change_type, original_value) = match self.snapshot.change_type(key) {
            ChangeType::Deleted => return Err(Error::Domain(deleted_message.to_string())),
            ChangeType::Unchanged => {
                let current = current.ok_or_else(|| Error::EntityNotFound(key.clone()))?;
                (
                    overlay([current, incoming]),
                    ChangeType::Updated,
                    Some(current.clone()),
                )
            }
            ChangeType::Added => (
                overlay(current.into_iter().chain([incoming])),
                ChangeType::Added,
                None,
            ),
            ChangeType::Updated => {
                let original = self.snapshot.original(key).or(current);
                (
                    overlay(original.into_iter().chain(current).chain([incoming])),
                    ChangeType::Updated,
                    original.cloned(),
                )
            }
        };

        if let Some(obj) = value.as_object_mut() {
            obj.insert(self.key_field.to_string(), key.to_value());
        }

        Ok(WriteTuple {
            key: key.clone(),
            value,
            change_type,
            original_value,
        })
    }

    fn key_of(&self, entity: &Entity) -> Result<EntityKey> {
        EntityKey::of(entity, self.key_field).map_err(|e| match e {
            Error::MissingKey(field) => {
                Error::InvalidOperation(format!("entity has no key in field '{}'", field))
            }
            other => other,
        })
    }
}

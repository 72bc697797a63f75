//! Durable record format.
//!
//! A durable record is the entity's own fields plus two write tags,
//! `changeType` and `originalValue`. The tags let a restarted process rebuild
//! its change state; they are stripped before a value leaves the engine.

use crate::{error::Result, ChangeState, ChangeType, Entity, Error, WriteTuple};

/// Tag holding the record's [`ChangeType`].
pub const CHANGE_TYPE_TAG: &str = "changeType";
/// Tag holding the record's original value.
pub const ORIGINAL_VALUE_TAG: &str = "originalValue";

/// An entity together with its write tags.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRecord {
    /// Entity value without tags
    pub value: Entity,
    pub change_type: ChangeType,
    pub original_value: Option<Entity>,
}

impl DurableRecord {
    /// Create a new record.
    pub fn new(value: Entity, change_type: ChangeType, original_value: Option<Entity>) -> Self {
        Self {
            value: strip_tags(value),
            change_type,
            original_value,
        }
    }

    /// Encode into a single JSON object with the tags inlined.
    pub fn to_value(&self) -> Entity {
        let mut obj = match &self.value {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        obj.insert(
            CHANGE_TYPE_TAG.to_string(),
            serde_json::Value::from(self.change_type.to_string()),
        );
        if let Some(original) = &self.original_value {
            obj.insert(ORIGINAL_VALUE_TAG.to_string(), original.clone());
        }
        serde_json::Value::Object(obj)
    }

    /// Decode a tagged JSON object.
    ///
    /// A record without a `changeType` tag is treated as `Unchanged`.
    pub fn from_value(value: Entity) -> Result<Self> {
        let mut obj = match value {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::InvalidRecord("record must be an object".into())),
        };

        let change_type = match obj.remove(CHANGE_TYPE_TAG) {
            None | Some(serde_json::Value::Null) => ChangeType::Unchanged,
            Some(tag) => serde_json::from_value(tag)
                .map_err(|e| Error::InvalidRecord(format!("bad {}: {}", CHANGE_TYPE_TAG, e)))?,
        };
        let original_value = obj
            .remove(ORIGINAL_VALUE_TAG)
            .filter(|v| !v.is_null());

        Ok(Self {
            value: serde_json::Value::Object(obj),
            change_type,
            original_value,
        })
    }

    /// The change state this record carries.
    pub fn change_state(&self) -> ChangeState {
        ChangeState {
            change_type: self.change_type,
            original_value: self.original_value.clone(),
        }
    }

    /// Drop the tags and return the bare entity.
    pub fn into_entity(self) -> Entity {
        self.value
    }
}

impl From<&WriteTuple> for DurableRecord {
    fn from(write: &WriteTuple) -> Self {
        Self::new(
            write.value.clone(),
            write.change_type,
            write.original_value.clone(),
        )
    }
}

/// Remove write tags from an entity value.
pub fn strip_tags(mut value: Entity) -> Entity {
    if let Some(obj) = value.as_object_mut() {
        obj.remove(CHANGE_TYPE_TAG);
        obj.remove(ORIGINAL_VALUE_TAG);
    }
    value
}

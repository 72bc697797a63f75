//! Entity keys and key extraction.

use crate::{error::Result, Entity, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field name used when a collection does not configure its own key path.
pub const DEFAULT_KEY_PATH: &str = "id";

/// Key identifying an entity within its collection.
///
/// Keys are either integers or strings. `1` and `"1"` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Int(i64),
    Str(String),
}

impl EntityKey {
    /// Read a key from a JSON value.
    ///
    /// `null` is reported as an invalid operation, since it means the caller
    /// supplied no key at all.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Err(Error::InvalidOperation("missing entity key".into())),
            serde_json::Value::String(s) => Ok(EntityKey::Str(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(EntityKey::Int)
                .ok_or_else(|| Error::InvalidKey(n.to_string())),
            other => Err(Error::InvalidKey(other.to_string())),
        }
    }

    /// Extract the key of `entity` from its `key_field`.
    pub fn of(entity: &Entity, key_field: &str) -> Result<Self> {
        let obj = entity
            .as_object()
            .ok_or_else(|| Error::InvalidEntity("entity must be an object".into()))?;

        match obj.get(key_field) {
            None | Some(serde_json::Value::Null) => Err(Error::MissingKey(key_field.to_string())),
            Some(v) => Self::from_value(v),
        }
    }

    /// Convert back into a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            EntityKey::Int(i) => serde_json::Value::from(*i),
            EntityKey::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }

    /// Stable textual encoding that keeps integer and string keys apart.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Inverse of [`EntityKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(encoded).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Self::from_value(&value)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Int(i) => write!(f, "{}", i),
            EntityKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        EntityKey::Int(value)
    }
}

impl From<i32> for EntityKey {
    fn from(value: i32) -> Self {
        EntityKey::Int(i64::from(value))
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        EntityKey::Str(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        EntityKey::Str(value)
    }
}

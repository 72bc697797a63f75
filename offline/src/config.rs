//! Configuration management for the offline store.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tether_engine::{CollectionSchema, Schema, StoreVersion, DEFAULT_KEY_PATH};

/// Offline store configuration.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Directory holding the store file
    pub data_dir: PathBuf,
    /// Durable store name
    pub store_name: String,
    /// How long to wait on a locked database before giving up
    pub busy_timeout: Duration,
    /// Store version and collections
    pub schema: Schema,
}

/// One entry of the `TETHER_COLLECTIONS` map.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionEntry {
    #[serde(default = "default_key_path")]
    key_path: String,
}

fn default_key_path() -> String {
    DEFAULT_KEY_PATH.to_string()
}

impl OfflineConfig {
    /// Create a configuration with defaults and no collections.
    pub fn new(data_dir: impl Into<PathBuf>, store_name: impl Into<String>, version: StoreVersion) -> Self {
        Self {
            data_dir: data_dir.into(),
            store_name: store_name.into(),
            busy_timeout: Duration::from_millis(5000),
            schema: Schema::new(version),
        }
    }

    /// Builder-style method to add a collection.
    pub fn with_collection(mut self, collection: CollectionSchema) -> Self {
        self.schema.add_collection(collection);
        self
    }

    /// Override the busy timeout.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("TETHER_DATA_DIR").unwrap_or_else(|| ".tether".to_string());
        let store_name = lookup("TETHER_STORE_NAME").unwrap_or_else(|| "tether".to_string());

        let version: StoreVersion = lookup("TETHER_STORE_VERSION")
            .unwrap_or_else(|| "1".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidVersion)?;
        if version == 0 {
            return Err(ConfigError::InvalidVersion);
        }

        let busy_timeout = lookup("TETHER_BUSY_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidBusyTimeout)?;

        let collections = lookup("TETHER_COLLECTIONS").ok_or(ConfigError::MissingCollections)?;
        let collections = parse_collections(&collections)?;

        let mut config = Self::new(data_dir, store_name, version).with_busy_timeout(busy_timeout);
        for collection in collections {
            config.schema.add_collection(collection);
        }
        Ok(config)
    }

    /// Path of the store file.
    pub fn store_path(&self) -> PathBuf {
        store_path(&self.data_dir, &self.store_name)
    }

    /// Key field of a configured entity type.
    pub fn key_path(&self, entity_name: &str) -> Result<&str, ConfigError> {
        self.schema
            .get_collection(entity_name)
            .map(|c| c.key_path.as_str())
            .ok_or_else(|| ConfigError::UnknownEntity(entity_name.to_string()))
    }
}

/// Path of the file backing store `name` in `data_dir`.
pub fn store_path(data_dir: &std::path::Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.sqlite", name))
}

/// Parse `{ "<entity>": { "keyPath": "<field>" } }`.
fn parse_collections(raw: &str) -> Result<Vec<CollectionSchema>, ConfigError> {
    let entries: BTreeMap<String, CollectionEntry> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidCollections(e.to_string()))?;

    if entries.is_empty() {
        return Err(ConfigError::InvalidCollections(
            "at least one collection is required".into(),
        ));
    }

    Ok(entries
        .into_iter()
        .map(|(name, entry)| CollectionSchema::new(name).with_key_path(entry.key_path))
        .collect())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TETHER_COLLECTIONS environment variable is required")]
    MissingCollections,

    #[error("Invalid TETHER_COLLECTIONS value: {0}")]
    InvalidCollections(String),

    #[error("Invalid TETHER_STORE_VERSION value")]
    InvalidVersion,

    #[error("Invalid TETHER_BUSY_TIMEOUT_MS value")]
    InvalidBusyTimeout,

    #[error("No collection configured for entity type '{0}'")]
    UnknownEntity(String),
}

//! Tether Offline - durable persistence for offline change tracking.
//!
//! Local mutations are classified by `tether-engine` and written to a SQLite
//! file, one table per entity type, so that pending changes survive process
//! restarts. Every write is tagged with its change type and original value;
//! callers only ever see bare entities.

pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod service;

pub use config::{ConfigError, OfflineConfig};
pub use db::{delete_store, lock_path, DurableStore};
pub use error::{OfflineError, Result};
pub use service::{OfflineCollectionService, OfflineServiceFactory, StoreHandle};

//! # Tether Engine
//!
//! Change tracking for offline-first entity collections.
//!
//! A client keeps working against a local copy of server-owned entities while
//! disconnected. Every local mutation is recorded as a reversible change
//! relative to the last known server state, so the accumulated changes can
//! later be sent as one changeset and reconciled with the server's answer.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, network or databases
//! - **Explicit snapshots**: every call receives the state it decides on
//! - **Exhaustive**: change types are a closed enum, every table is matched
//!
//! ## Core Concepts
//!
//! ### Change state
//!
//! Each entity is [`ChangeType::Unchanged`], [`ChangeType::Added`],
//! [`ChangeType::Updated`] or [`ChangeType::Deleted`]. Updated and deleted
//! entities keep their last known server value as the original value.
//!
//! ### Classification
//!
//! The [`Classifier`] folds an incoming add, delete, update or upsert into the
//! tracked state and returns the [`WriteOutcome`] to persist.
//!
//! ### Durable records
//!
//! A [`DurableRecord`] is an entity plus its `changeType` / `originalValue`
//! tags, the format persisted for crash recovery.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] merges server results into a collection snapshot using
//! a [`MergeStrategy`], and [`ChangeSet::from_snapshot`] builds the batch that
//! is sent to the server.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{ChangeType, Classifier, EntityCollection, EntityUpdate, WriteOutcome};
//! use serde_json::json;
//!
//! // 1. Snapshot of the state container
//! let mut heroes = EntityCollection::from_entities("id", vec![json!({"id": 1, "name": "A"})])
//!     .unwrap();
//!
//! // 2. Classify a local update
//! let write = Classifier::new("id", &heroes)
//!     .update(&EntityUpdate::new(1, json!({"name": "B"})))
//!     .unwrap();
//! assert_eq!(write.change_type, ChangeType::Updated);
//! assert_eq!(write.original_value, Some(json!({"id": 1, "name": "A"})));
//!
//! // 3. Commit the result back into the snapshot
//! heroes.apply_write(&WriteOutcome::Put(write));
//! assert_eq!(heroes.pending_count(), 1);
//! ```

pub mod change;
pub mod changeset;
pub mod classify;
pub mod error;
pub mod key;
pub mod operation;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod snapshot;

// Re-export main types at crate root
pub use change::{ChangeState, ChangeStateMap, ChangeType, EntityMap};
pub use changeset::{ChangeSet, ChangeSetItem};
pub use classify::{overlay, Classifier, WriteOutcome, WriteTuple};
pub use error::Error;
pub use key::{EntityKey, DEFAULT_KEY_PATH};
pub use operation::{EntityOp, EntityUpdate};
pub use reconcile::{MergeReport, MergeStrategy, Reconciler};
pub use record::{strip_tags, DurableRecord, CHANGE_TYPE_TAG, ORIGINAL_VALUE_TAG};
pub use schema::{CollectionSchema, Schema};
pub use snapshot::EntityCollection;

/// Type aliases for clarity
pub type Entity = serde_json::Value;
pub type EntityName = String;
pub type StoreVersion = u32;

//! Error types for the Tether engine.

use crate::{EntityKey, EntityName};
use thiserror::Error;

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("entity has no key in field '{0}'")]
    MissingKey(String),

    #[error("invalid entity key: {0}")]
    InvalidKey(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityKey),

    #[error("unknown collection: {0}")]
    UnknownCollection(EntityName),

    // Domain errors
    #[error("{0}")]
    Domain(String),

    // Durable record errors
    #[error("invalid durable record: {0}")]
    InvalidRecord(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

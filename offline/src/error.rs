//! Unified error handling for the offline layer.

use crate::config::ConfigError;
use tether_engine::StoreVersion;

/// Offline layer error type.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    /// Validation or domain failure reported by the engine
    #[error("offline service error: {0}")]
    Service(#[from] tether_engine::Error),

    #[error("upgrade of store '{name}' to version {version} is blocked by an open connection")]
    Blocked { name: String, version: StoreVersion },

    #[error("store '{name}' is at version {on_disk}, newer than requested version {requested}")]
    VersionTooNew {
        name: String,
        on_disk: i64,
        requested: StoreVersion,
    },

    #[error("store I/O error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} is not served by the offline store")]
    Unsupported(&'static str),
}

/// Result type alias for the offline layer.
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Whether a store error means another connection holds the database lock.
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5" | "6" | "261" | "262" | "517")
        ),
        _ => false,
    }
}

//! Durable store connection management.
//!
//! A store is one SQLite file. Each configured collection is a table keyed
//! by the encoded entity key; a bookkeeping table remembers which
//! collections exist and which field keys them. The schema version lives in
//! `PRAGMA user_version` and only a version bump triggers an upgrade.
//!
//! Every open connection holds a shared lock on `<store>.sqlite.lock`, in
//! this process or any other. Upgrades and deletion need that lock
//! exclusively and report the store as blocked when they cannot get it.

use crate::config::{store_path, ConfigError, OfflineConfig};
use crate::error::{is_busy, OfflineError, Result};
use fs2::FileExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tether_engine::{Schema, StoreVersion};

/// Table recording the collections present in the store.
pub(crate) const COLLECTIONS_TABLE: &str = "tether_collections";

/// An open connection to a durable store.
///
/// Dropping the store releases its lock; [`DurableStore::close`]
/// additionally waits for the native connection to shut down.
#[derive(Debug)]
pub struct DurableStore {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) path: PathBuf,
    pub(crate) pool: SqlitePool,
    _lock: File,
}

impl DurableStore {
    /// Open the store described by `config`, upgrading it when its on-disk
    /// version is behind the configured one.
    pub async fn open(config: &OfflineConfig) -> Result<Self> {
        if config.schema.version == 0 {
            return Err(ConfigError::InvalidVersion.into());
        }
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let data_dir = tokio::fs::canonicalize(&config.data_dir).await?;
        let path = store_path(&data_dir, &config.store_name);
        let version = config.schema.version;
        let lock = open_lock_file(&path)?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        // Every failure past this point closes the pool before surfacing.
        if let Err(e) = prepare(&pool, &lock, &config.store_name, &config.schema).await {
            pool.close().await;
            return Err(e);
        }

        tracing::info!(
            store = %config.store_name,
            version,
            path = %path.display(),
            "Opened offline store"
        );

        Ok(Self {
            name: config.store_name.clone(),
            schema: config.schema.clone(),
            path,
            pool,
            _lock: lock,
        })
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured schema version.
    pub fn version(&self) -> StoreVersion {
        self.schema.version
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the collections present in the store.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(&format!(
            "SELECT name FROM {} ORDER BY name",
            COLLECTIONS_TABLE
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Close the native connection and release the lock.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!(store = %self.name, "Closed offline store");
    }
}

/// Path of the lock file guarding the store at `path`.
pub fn lock_path(path: &Path) -> PathBuf {
    side_path(path, ".lock")
}

fn side_path(path: &Path, suffix: &str) -> PathBuf {
    let mut side = path.as_os_str().to_os_string();
    side.push(suffix);
    PathBuf::from(side)
}

fn open_lock_file(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?;
    Ok(file)
}

/// Whether a lock attempt failed because someone else holds the lock.
fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind()
}

/// Check the on-disk version and upgrade when needed.
///
/// The check runs inside a write transaction so concurrent opens see each
/// other's upgrades. On success `lock` is held shared.
async fn prepare(pool: &SqlitePool, lock: &File, name: &str, schema: &Schema) -> Result<()> {
    let requested = schema.version;
    let blocked = || OfflineError::Blocked {
        name: name.to_string(),
        version: requested,
    };

    let mut conn = pool.acquire().await?;
    if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
        return Err(if is_busy(&e) { blocked() } else { e.into() });
    }

    match check_version(&mut *conn, lock, name, schema).await {
        Ok(upgraded_from) => {
            sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| {
                if is_busy(&e) {
                    blocked()
                } else {
                    e.into()
                }
            })?;
            if let Some(from) = upgraded_from {
                tracing::info!(store = %name, from, to = requested, "Upgraded offline store");
            }
            Ok(())
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                tracing::error!(store = %name, error = %rollback, "Rollback of failed open failed");
            }
            Err(e)
        }
    }
}

/// Returns the version upgraded from, or `None` when the store was current.
async fn check_version(
    conn: &mut SqliteConnection,
    lock: &File,
    name: &str,
    schema: &Schema,
) -> Result<Option<i64>> {
    let requested = schema.version;
    let blocked = |e: std::io::Error| {
        if is_contended(&e) {
            tracing::warn!(store = %name, version = requested, "Store is locked by another connection");
            OfflineError::Blocked {
                name: name.to_string(),
                version: requested,
            }
        } else {
            e.into()
        }
    };

    let on_disk: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;

    if on_disk > i64::from(requested) {
        return Err(OfflineError::VersionTooNew {
            name: name.to_string(),
            on_disk,
            requested,
        });
    }
    if on_disk == i64::from(requested) {
        FileExt::try_lock_shared(lock).map_err(blocked)?;
        return Ok(None);
    }

    FileExt::try_lock_exclusive(lock).map_err(blocked)?;
    upgrade(conn, schema).await?;
    // Downgrade before the transaction ends so no other open slips in between.
    FileExt::lock_shared(lock)?;
    Ok(Some(on_disk))
}

/// Bring the collection set in line with `schema`.
///
/// Collections missing from the schema are dropped, configured collections
/// missing from the store are created, the rest are left as they are.
/// Running it twice leaves the store unchanged.
async fn upgrade(conn: &mut SqliteConnection, schema: &Schema) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY NOT NULL, key_path TEXT NOT NULL)",
        COLLECTIONS_TABLE
    ))
    .execute(&mut *conn)
    .await?;

    let existing: BTreeSet<String> = sqlx::query_scalar::<_, String>(&format!(
        "SELECT name FROM {}",
        COLLECTIONS_TABLE
    ))
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    for name in existing.iter().filter(|n| schema.get_collection(n).is_none()) {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table_name(name)))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!("DELETE FROM {} WHERE name = ?", COLLECTIONS_TABLE))
            .bind(name)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(collection = %name, "Dropped collection");
    }

    for collection in schema.collections.values() {
        if existing.contains(&collection.name) {
            continue;
        }
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY NOT NULL, record TEXT NOT NULL)",
            table_name(&collection.name)
        ))
        .execute(&mut *conn)
        .await?;
        sqlx::query(&format!(
            "INSERT INTO {} (name, key_path) VALUES (?, ?)",
            COLLECTIONS_TABLE
        ))
        .bind(&collection.name)
        .bind(&collection.key_path)
        .execute(&mut *conn)
        .await?;
        tracing::debug!(collection = %collection.name, key_path = %collection.key_path, "Created collection");
    }

    // PRAGMA does not accept bound parameters; the version is an integer.
    sqlx::query(&format!("PRAGMA user_version = {}", schema.version))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Quoted table name backing a collection.
pub(crate) fn table_name(collection: &str) -> String {
    format!("\"collection_{}\"", collection.replace('"', "\"\""))
}

/// Delete the store `name` in `data_dir`.
///
/// Never fails: a store that is still open in any process, or a file the
/// filesystem refuses to remove, is logged and reported as `false`. The lock
/// file itself is kept so concurrent openers keep agreeing on it.
pub async fn delete_store(data_dir: &Path, name: &str) -> bool {
    let data_dir = match tokio::fs::canonicalize(data_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
        Err(e) => {
            tracing::warn!(store = %name, error = %e, "Cannot resolve store directory");
            return false;
        }
    };
    let path = store_path(&data_dir, name);

    let lock = match open_lock_file(&path) {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!(store = %name, error = %e, "Cannot open store lock");
            return false;
        }
    };
    if let Err(e) = FileExt::try_lock_exclusive(&lock) {
        if is_contended(&e) {
            tracing::warn!(store = %name, "Delete blocked by an open connection");
        } else {
            tracing::warn!(store = %name, error = %e, "Cannot lock store for deletion");
        }
        return false;
    }

    for file in [path.clone(), side_path(&path, "-wal"), side_path(&path, "-shm")] {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(store = %name, file = %file.display(), error = %e, "Failed to delete store file");
                return false;
            }
        }
    }

    tracing::info!(store = %name, "Deleted offline store");
    true
}

//! Administrative commands behind the `tether-offline` binary.

use crate::config::OfflineConfig;
use crate::db::delete_store;
use crate::error::Result;
use crate::service::OfflineServiceFactory;
use std::io::Write;
use tether_engine::{ChangeSet, ChangeType};

/// Write every pending record as one JSON line to `out`.
///
/// Without a collection, every configured collection is inspected in name
/// order. Returns the number of lines written.
pub async fn inspect(
    factory: &OfflineServiceFactory,
    collection: Option<&str>,
    out: &mut impl Write,
) -> Result<usize> {
    let names: Vec<String> = match collection {
        Some(name) => vec![name.to_string()],
        None => factory.config().schema.collection_names().cloned().collect(),
    };

    let mut written = 0;
    for name in names {
        let service = factory.create(&name)?;
        for record in service.records().await? {
            if record.change_type == ChangeType::Unchanged {
                continue;
            }
            let line = serde_json::json!({
                "collection": service.entity_name(),
                "record": record.to_value(),
            });
            writeln!(out, "{}", line)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Build the changeset a sync of `collection` would send.
pub async fn changeset(factory: &OfflineServiceFactory, collection: &str) -> Result<ChangeSet> {
    let service = factory.create(collection)?;
    let snapshot = service.restore().await?;
    Ok(ChangeSet::from_snapshot(collection, &snapshot))
}

/// Delete the configured store; `false` when it is still in use.
pub async fn reset(config: &OfflineConfig) -> bool {
    let deleted = delete_store(&config.data_dir, &config.store_name).await;
    if deleted {
        tracing::info!(store = %config.store_name, "Store reset");
    } else {
        tracing::warn!(store = %config.store_name, "Store was not reset");
    }
    deleted
}

//! Record reads and writes against a durable collection.
//!
//! Each write runs in its own transaction scoped to one collection table.

use super::pool::{table_name, DurableStore};
use crate::error::Result;
use tether_engine::{DurableRecord, EntityKey};

impl DurableStore {
    /// Upsert a record by key, replacing any previous record wholesale.
    pub async fn put(
        &self,
        collection: &str,
        key: &EntityKey,
        record: DurableRecord,
    ) -> Result<DurableRecord> {
        let table = self.table(collection)?;
        let encoded = serde_json::to_string(&record.to_value())?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO {} (key, record) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET record = excluded.record",
            table
        ))
        .bind(key.encode())
        .bind(encoded)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(
            collection,
            key = %key,
            change = %record.change_type,
            "Put offline record"
        );
        Ok(record)
    }

    /// Remove the record stored under `key`.
    pub async fn delete(&self, collection: &str, key: &EntityKey) -> Result<EntityKey> {
        let table = self.table(collection)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", table))
            .bind(key.encode())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(collection, key = %key, "Deleted offline record");
        Ok(key.clone())
    }

    /// Get the record stored under `key`.
    pub async fn get(&self, collection: &str, key: &EntityKey) -> Result<Option<DurableRecord>> {
        let table = self.table(collection)?;

        let raw: Option<String> =
            sqlx::query_scalar(&format!("SELECT record FROM {} WHERE key = ?", table))
                .bind(key.encode())
                .fetch_optional(&self.pool)
                .await?;

        raw.map(|raw| decode(&raw)).transpose()
    }

    /// Get every record of a collection, ordered by encoded key.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<DurableRecord>> {
        let table = self.table(collection)?;

        let rows: Vec<String> =
            sqlx::query_scalar(&format!("SELECT record FROM {} ORDER BY key", table))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|raw| decode(raw)).collect()
    }

    fn table(&self, collection: &str) -> Result<String> {
        self.schema.require_collection(collection)?;
        Ok(table_name(collection))
    }
}

fn decode(raw: &str) -> Result<DurableRecord> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(DurableRecord::from_value(value)?)
}

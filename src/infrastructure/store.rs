//! Persistent key-value store backing work-item state
//!
//! Items survive process restarts so an interrupted batch can be resumed.
//! The store is a flat namespace of JSON values; work items live under the
//! `item:` prefix and are wrapped by [`WorkItemStore`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use tokio::sync::RwLock;

use crate::domain::work_item::{WorkItem, WorkItemStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal async key-value contract.
///
/// Both the sqlite-backed store and the in-memory test store implement this,
/// so the orchestrator never knows which one it is holding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// All keys starting with `prefix`, in unspecified order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// SQLite-backed store. A single `kv` table keeps the schema trivial and
/// lets work items be inspected with any sqlite client.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite://{}", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT key FROM kv WHERE key LIKE ? ESCAPE '\\'")
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

const ITEM_PREFIX: &str = "item:";

/// Typed facade over the raw store for work items.
#[derive(Clone)]
pub struct WorkItemStore {
    inner: Arc<dyn KeyValueStore>,
}

impl WorkItemStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    fn key_for(product_id: &str) -> String {
        format!("{ITEM_PREFIX}{product_id}")
    }

    pub async fn put_item(&self, item: &WorkItem) -> Result<(), StoreError> {
        let json = serde_json::to_string(item)?;
        self.inner.set(&Self::key_for(&item.product_id), &json).await
    }

    pub async fn get_item(&self, product_id: &str) -> Result<Option<WorkItem>, StoreError> {
        match self.inner.get(&Self::key_for(product_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn all_items(&self) -> Result<Vec<WorkItem>, StoreError> {
        let keys = self.inner.keys(ITEM_PREFIX).await?;
        let values = try_join_all(keys.iter().map(|key| self.inner.get(key))).await?;
        let mut items = Vec::with_capacity(values.len());
        for json in values.into_iter().flatten() {
            items.push(serde_json::from_str(&json)?);
        }
        Ok(items)
    }

    /// True when every listed product id is present and terminal. An absent
    /// record means the item never ran, so the batch is not complete.
    pub async fn is_batch_complete(&self, product_ids: &[String]) -> Result<bool, StoreError> {
        for id in product_ids {
            match self.get_item(id).await? {
                Some(item) if item.status.is_terminal() => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    pub async fn purge(&self, product_ids: &[String]) -> Result<(), StoreError> {
        try_join_all(product_ids.iter().map(|id| async move {
            self.inner.remove(&Self::key_for(id)).await
        }))
        .await?;
        Ok(())
    }

    /// Terminal tallies for a batch, used for the completion event.
    pub async fn batch_outcome(
        &self,
        product_ids: &[String],
    ) -> Result<(usize, usize), StoreError> {
        let mut listed = 0usize;
        let mut failed = 0usize;
        for id in product_ids {
            match self.get_item(id).await? {
                Some(item) if item.status == WorkItemStatus::Listed => listed += 1,
                Some(item) if item.status == WorkItemStatus::Failed => failed += 1,
                _ => {}
            }
        }
        Ok((listed, failed))
    }
}

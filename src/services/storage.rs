use std::collections::HashMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::dal::kv_store_db;

pub const TAB_STATES_KEY: &str = "tabStates";
pub const RETRY_QUEUE_KEY: &str = "retryQueue";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("stored value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable key-value blobs, read and written wholesale.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn save(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

pub async fn save_as<T: Serialize + Sync>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value)?;
    storage.save(key, value).await
}

pub async fn load_as<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.load(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        PgStorage { pool }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(kv_store_db::get_value(&self.pool, key).await?)
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StorageError> {
        kv_store_db::set_value(&self.pool, key, &value).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().await.insert(key.to_string(), value);
        *self.writes.lock().await += 1;
        Ok(())
    }
}

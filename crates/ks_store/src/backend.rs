//! Row-level storage contract.
//!
//! Keys here are physical keys (`"{session_id}:{logical_key}"`); values are
//! already-serialised text. Each call is one independent round trip.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

#[async_trait]
pub trait AuthDataBackend: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace; last write wins.
    async fn upsert(&self, key: &str, data: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every row whose key starts with `prefix`, matched literally.
    /// Returns the number of rows removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

/// In-process backend with the same semantics as the Postgres table.
/// Cheap to clone; clones share rows.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    rows: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.rows.read().await.keys().cloned().collect()
    }

    /// Write raw text, bypassing the codec. Useful for seeding rows written
    /// by other clients.
    pub async fn insert_raw(&self, key: impl Into<String>, data: impl Into<String>) {
        self.rows.write().await.insert(key.into(), data.into());
    }
}

#[async_trait]
impl AuthDataBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &str, data: &str) -> Result<(), StoreError> {
        self.rows
            .write()
            .await
            .insert(key.to_owned(), data.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|key, _| !key.starts_with(prefix));
        Ok((before - rows.len()) as u64)
    }
}

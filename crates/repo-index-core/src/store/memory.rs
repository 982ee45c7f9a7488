//! In-memory [`BlobStore`] and [`MetadataStore`] implementations.
//!
//! Both use `HashMap`s behind `tokio::sync::RwLock`. The status
//! compare-and-set holds the write lock across the read and the write, so
//! it is atomic with respect to every other call on the same store.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, MetadataStore};
use crate::models::{RepoKey, RepositoryRecord};
use crate::status::RepoStatus;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory blob store.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded by the last `put` under `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|b| b.content_type.clone())
    }

    /// Store raw bytes directly, bypassing the codec.
    pub async fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.blobs.write().await.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: "application/octet-stream".to_string(),
            },
        );
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).map(|b| b.bytes.clone()))
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.blobs.write().await.insert(
            key.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

/// In-memory repository metadata store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<RepoKey, RepositoryRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record as-is.
    pub async fn insert(&self, record: RepositoryRecord) {
        self.records.write().await.insert(record.key(), record);
    }
}

fn missing(key: &RepoKey) -> anyhow::Error {
    anyhow!("repository {} is not registered", key)
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &RepoKey) -> Result<Option<RepositoryRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<RepositoryRecord>> {
        let mut records: Vec<RepositoryRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| (&a.owner, &a.repo).cmp(&(&b.owner, &b.repo)));
        Ok(records)
    }

    async fn create_if_absent(&self, key: &RepoKey, now: i64) -> Result<(RepositoryRecord, bool)> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(key) {
            return Ok((existing.clone(), false));
        }
        let record = RepositoryRecord::pending(key, now);
        records.insert(key.clone(), record.clone());
        Ok((record, true))
    }

    async fn compare_and_set_status(
        &self,
        key: &RepoKey,
        expected: RepoStatus,
        next: RepoStatus,
        now: i64,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        let record = records.get_mut(key).ok_or_else(|| missing(key))?;
        if record.status != expected {
            return Ok(false);
        }
        record.status = next;
        record.updated_at = now;
        Ok(true)
    }

    async fn mark_active(&self, key: &RepoKey, last_sync_at: i64, now: i64) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(key).ok_or_else(|| missing(key))?;
        record.status = RepoStatus::Active;
        record.last_sync_at = last_sync_at;
        record.error_message = None;
        record.updated_at = now;
        Ok(())
    }

    async fn mark_error(&self, key: &RepoKey, message: &str, now: i64) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(key).ok_or_else(|| missing(key))?;
        record.status = RepoStatus::Error;
        record.error_message = Some(message.to_string());
        record.updated_at = now;
        Ok(())
    }
}

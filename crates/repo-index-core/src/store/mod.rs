//! Storage abstractions for the sync engine.
//!
//! Two stores back every sync:
//!
//! | Trait | Holds | Keyed by |
//! |-------|-------|----------|
//! | [`BlobStore`] | compressed [`VectorObject`](crate::models::VectorObject) blobs | `"{owner}/{repo}.json.gz"` |
//! | [`MetadataStore`] | [`RepositoryRecord`]s (status, last sync, error) | `(owner, repo)` |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! [`memory`] provides in-process implementations of both.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{RepoKey, RepositoryRecord};
use crate::status::RepoStatus;

/// Blob store key of a repository's vector object.
pub fn vector_object_key(key: &RepoKey) -> String {
    format!("{}/{}.json.gz", key.owner, key.repo)
}

/// Opaque byte storage. Last write wins; a `put` either fully replaces the
/// previous value or leaves it in place.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob; `None` if nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob under `key`.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

/// Repository metadata records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](MetadataStore::get) | Read one record |
/// | [`list`](MetadataStore::list) | Read all records |
/// | [`create_if_absent`](MetadataStore::create_if_absent) | Register a repository as `pending` |
/// | [`compare_and_set_status`](MetadataStore::compare_and_set_status) | Atomic status transition |
/// | [`mark_active`](MetadataStore::mark_active) | Record a successful sync |
/// | [`mark_error`](MetadataStore::mark_error) | Record a failed sync |
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &RepoKey) -> Result<Option<RepositoryRecord>>;

    async fn list(&self) -> Result<Vec<RepositoryRecord>>;

    /// Insert a `pending` record unless one exists. Returns the stored record
    /// and `true` if it was created by this call.
    async fn create_if_absent(&self, key: &RepoKey, now: i64) -> Result<(RepositoryRecord, bool)>;

    /// Set `status = next` only if it currently equals `expected`, as one
    /// atomic step. Returns whether the update happened.
    async fn compare_and_set_status(
        &self,
        key: &RepoKey,
        expected: RepoStatus,
        next: RepoStatus,
        now: i64,
    ) -> Result<bool>;

    /// `status = active`, `last_sync_at = last_sync_at`, error cleared.
    async fn mark_active(&self, key: &RepoKey, last_sync_at: i64, now: i64) -> Result<()>;

    /// `status = error` with `message`; `last_sync_at` is left alone.
    async fn mark_error(&self, key: &RepoKey, message: &str, now: i64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_object_key() {
        assert_eq!(
            vector_object_key(&RepoKey::new("acme", "widget")),
            "acme/widget.json.gz"
        );
    }
}

//! Sync orchestration: the per-repository state machine.
//!
//! [`SyncEngine::sync`] runs one sync for one repository:
//!
//! 1. Read the record. Reject with `NotFound`, `Conflict` (already
//!    `syncing`/`backfilling`), or `Authorization` (no upstream client).
//! 2. Claim the repository with an atomic status compare-and-set
//!    (`backfilling` on first sync, `syncing` afterwards). Losing the race
//!    is a `Conflict`. The claim is persisted before any remote work.
//! 3. Load and decode the previous vector object, fetch upstream items,
//!    plan, embed and merge, encode, and write the new blob.
//! 4. Mark the record `active` with the new `last_sync_at`, or `error`
//!    with the failure message. A failed sync leaves the blob untouched,
//!    except when the final `active` update fails after the new blob was
//!    written: the record then says `error` while the new index is live.
//!
//! Every external call in step 3 is bounded by [`SyncOptions::call_timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::codec;
use crate::embedding::Embedder;
use crate::error::{CodecError, SyncError};
use crate::merge::merge;
use crate::models::{RepoKey, RepositoryRecord, VectorObject};
use crate::plan::plan;
use crate::status::RepoStatus;
use crate::store::{vector_object_key, BlobStore, MetadataStore};
use crate::upstream::{FetchQuery, UpstreamSource};

/// Tuning for a [`SyncEngine`], decoupled from application config.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Issues fetched per sync.
    pub issues_first: u32,
    /// Pull requests fetched per sync.
    pub pull_requests_first: u32,
    /// Changed files fetched per pull request.
    pub files_first: u32,
    /// Treat an undecodable stored blob as "no previous index" instead of
    /// failing the sync.
    pub discard_corrupt_store: bool,
    /// Upper bound on each external call (blob read, fetch, embedding, write).
    pub call_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            issues_first: 1,
            pull_requests_first: 1,
            files_first: 100,
            discard_corrupt_store: false,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub repo: String,
    pub status: RepoStatus,
    pub last_sync_at: i64,
    pub issues_count: usize,
    pub pull_requests_count: usize,
    #[serde(skip)]
    pub embedded: usize,
    #[serde(skip)]
    pub carried_over: usize,
    #[serde(skip)]
    pub removed: usize,
}

/// Drives syncs against injected stores and services.
pub struct SyncEngine {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    upstream: Option<Arc<dyn UpstreamSource>>,
    embedder: Arc<dyn Embedder>,
    options: SyncOptions,
}

impl SyncEngine {
    /// `upstream` is `None` when no GitHub credential is available; every
    /// sync is then rejected with [`SyncError::Authorization`].
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        upstream: Option<Arc<dyn UpstreamSource>>,
        embedder: Arc<dyn Embedder>,
        options: SyncOptions,
    ) -> Self {
        Self {
            metadata,
            blobs,
            upstream,
            embedder,
            options,
        }
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Run one sync for `key`. See the module docs for the state machine.
    pub async fn sync(&self, key: &RepoKey) -> Result<SyncOutcome, SyncError> {
        let record = self
            .metadata
            .get(key)
            .await
            .map_err(|e| SyncError::Storage(format!("{:#}", e)))?
            .ok_or_else(|| SyncError::NotFound(key.full_name()))?;

        if record.status.is_in_flight() {
            return Err(SyncError::Conflict(key.full_name()));
        }

        let Some(upstream) = self.upstream.as_deref() else {
            return Err(SyncError::Authorization(
                "no GitHub account linked".to_string(),
            ));
        };

        let in_flight = RepoStatus::in_flight_for(record.last_sync_at);
        let claimed = self
            .metadata
            .compare_and_set_status(key, record.status, in_flight, now_millis())
            .await
            .map_err(|e| SyncError::Storage(format!("{:#}", e)))?;
        if !claimed {
            return Err(SyncError::Conflict(key.full_name()));
        }
        info!(repo = %key, status = %in_flight, since = record.last_sync_at, "sync started");

        match self.run(key, &record, upstream).await {
            Ok(outcome) => {
                info!(
                    repo = %key,
                    issues = outcome.issues_count,
                    pull_requests = outcome.pull_requests_count,
                    embedded = outcome.embedded,
                    carried_over = outcome.carried_over,
                    removed = outcome.removed,
                    "sync complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(repo = %key, code = err.code(), "sync failed: {}", err);
                if let Err(e) = self
                    .metadata
                    .mark_error(key, &err.to_string(), now_millis())
                    .await
                {
                    error!(repo = %key, "failed to record sync error: {:#}", e);
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        key: &RepoKey,
        record: &RepositoryRecord,
        upstream: &dyn UpstreamSource,
    ) -> Result<SyncOutcome, SyncError> {
        let object_key = vector_object_key(key);

        let stored = self
            .bounded("blob read", self.blobs.get(&object_key))
            .await
            .map_err(|e| SyncError::Storage(format!("{:#}", e)))?;
        let previous = match stored {
            Some(bytes) => self.decode_previous(key, &bytes)?,
            None => None,
        };

        let query = FetchQuery {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            since: since(record.last_sync_at),
            issues_first: self.options.issues_first,
            pull_requests_first: self.options.pull_requests_first,
            files_first: self.options.files_first,
        };
        let fetched = self
            .bounded("upstream fetch", upstream.fetch(&query))
            .await
            .map_err(|e| SyncError::UpstreamFetch(format!("{:#}", e)))?;

        let changes = plan(
            previous.as_ref(),
            &fetched.issues,
            &fetched.pull_requests,
        );

        let synced_at = match &previous {
            Some(p) => now_millis().max(p.synced_at.saturating_add(1)),
            None => now_millis(),
        };
        let merged = tokio::time::timeout(
            self.options.call_timeout,
            merge(key, previous.as_ref(), &changes, self.embedder.as_ref(), synced_at),
        )
        .await
        .map_err(|_| {
            SyncError::EmbeddingService(format!(
                "timed out after {}s",
                self.options.call_timeout.as_secs()
            ))
        })??;

        let bytes = codec::encode(&merged.object).map_err(|e| SyncError::Persist(e.to_string()))?;
        self.bounded(
            "blob write",
            self.blobs.put(&object_key, &bytes, codec::CONTENT_TYPE),
        )
        .await
        .map_err(|e| SyncError::Persist(format!("{:#}", e)))?;

        if let Err(e) = self
            .metadata
            .mark_active(key, synced_at, now_millis())
            .await
        {
            error!(
                repo = %key,
                synced_at,
                "new index written but record update failed: {:#}", e
            );
            return Err(SyncError::Storage(format!("{:#}", e)));
        }

        Ok(SyncOutcome {
            repo: key.full_name(),
            status: RepoStatus::Active,
            last_sync_at: synced_at,
            issues_count: merged.object.issues.len(),
            pull_requests_count: merged.object.pull_requests.len(),
            embedded: merged.embedded,
            carried_over: merged.carried_over,
            removed: merged.removed,
        })
    }

    fn decode_previous(
        &self,
        key: &RepoKey,
        bytes: &[u8],
    ) -> Result<Option<VectorObject>, SyncError> {
        let decoded = codec::decode(bytes).and_then(|object| {
            if object.repo == key.full_name() {
                Ok(object)
            } else {
                Err(CodecError::Invalid(format!(
                    "blob belongs to '{}', not '{}'",
                    object.repo, key
                )))
            }
        });
        match decoded {
            Ok(object) => Ok(Some(object)),
            Err(e) if self.options.discard_corrupt_store => {
                warn!(repo = %key, "discarding undecodable vector object: {}", e);
                Ok(None)
            }
            Err(e) => Err(SyncError::StoreCorrupt(e)),
        }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "{} timed out after {}s",
                what,
                self.options.call_timeout.as_secs()
            )),
        }
    }
}

/// Current time in epoch millis.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn since(last_sync_at: i64) -> Option<DateTime<Utc>> {
    if last_sync_at > 0 {
        DateTime::from_timestamp_millis(last_sync_at)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_only_after_first_sync() {
        assert_eq!(since(0), None);
        let ts = since(1_700_000_000_000).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_outcome_serializes_public_fields() {
        let outcome = SyncOutcome {
            repo: "acme/widget".to_string(),
            status: RepoStatus::Active,
            last_sync_at: 5,
            issues_count: 1,
            pull_requests_count: 2,
            embedded: 3,
            carried_over: 0,
            removed: 0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["lastSyncAt"], 5);
        assert_eq!(json["issuesCount"], 1);
        assert_eq!(json["pullRequestsCount"], 2);
        assert!(json.get("embedded").is_none());
    }
}

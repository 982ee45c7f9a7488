//! Error types for the sync engine.

use thiserror::Error;

/// Failure to encode or decode a persisted [`VectorObject`](crate::models::VectorObject).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("gzip stream error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("vector object JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid vector object: {0}")]
    Invalid(String),
}

/// Every way a sync can fail. Callers see one of these, and the
/// repository record is moved to `error` with its message for all but
/// the precondition failures (`NotFound`, `Conflict`, `Authorization`).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("sync already in progress for {0}")]
    Conflict(String),

    #[error("no GitHub credential available: {0}")]
    Authorization(String),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("stored vector object is corrupt: {0}")]
    StoreCorrupt(#[from] CodecError),

    #[error("embedding service failed: {0}")]
    EmbeddingService(String),

    #[error("failed to persist vector object: {0}")]
    Persist(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotFound(_) => "not_found",
            SyncError::Conflict(_) => "conflict",
            SyncError::Authorization(_) => "unauthorized",
            SyncError::UpstreamFetch(_) => "upstream_fetch",
            SyncError::StoreCorrupt(_) => "store_corrupt",
            SyncError::EmbeddingService(_) => "embedding_service",
            SyncError::Persist(_) => "persist",
            SyncError::Storage(_) => "storage",
        }
    }

    /// Precondition failures leave the repository record untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_) | SyncError::Conflict(_) | SyncError::Authorization(_)
        )
    }
}

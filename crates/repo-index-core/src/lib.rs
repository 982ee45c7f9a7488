//! # Repo Index Core
//!
//! The incremental synchronization engine behind Repo Index: content
//! fingerprints, the compressed vector object codec, change planning,
//! embedding merge, and the per-repository sync state machine.
//!
//! This crate performs no network or database I/O of its own. Every
//! external collaborator (GitHub, the embedding service, the blob store,
//! the repository metadata store) is reached through a trait, so the
//! application supplies real backends and tests supply in-memory ones.
//!
//! ```text
//! SyncEngine::sync
//!   ├─ MetadataStore::compare_and_set_status   (pending|active|error → syncing)
//!   ├─ BlobStore::get  → codec::decode          (previous VectorObject)
//!   ├─ UpstreamSource::fetch                    (issues + pull requests)
//!   ├─ plan::plan      → fingerprint            (ChangeSet)
//!   ├─ merge::merge    → Embedder::embed        (new VectorObject)
//!   ├─ codec::encode   → BlobStore::put
//!   └─ MetadataStore::mark_active | mark_error
//! ```

pub mod codec;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod models;
pub mod plan;
pub mod status;
pub mod store;
pub mod sync;
pub mod upstream;

pub use error::{CodecError, SyncError};
pub use models::{RepoKey, VectorObject};
pub use status::RepoStatus;
pub use sync::{SyncEngine, SyncOptions, SyncOutcome};

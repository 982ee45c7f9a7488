//! Wiring of configured backends into a [`SyncEngine`].
//!
//! | Concern | Backend |
//! |---------|---------|
//! | metadata | [`SqliteMetadataStore`] on `[db].path` |
//! | blobs | [`FsBlobStore`] or [`S3BlobStore`] per `[storage].backend` |
//! | upstream | [`GithubClient`] when the token variable is set |
//! | embeddings | [`ProviderEmbedder`] per `[embedding]` |

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use repo_index_core::store::BlobStore;
use repo_index_core::upstream::UpstreamSource;
use repo_index_core::SyncEngine;

use crate::blob_fs::FsBlobStore;
use crate::blob_s3::S3BlobStore;
use crate::config::{Config, StorageConfig};
use crate::db;
use crate::embedding::ProviderEmbedder;
use crate::github::GithubClient;
use crate::migrate;
use crate::repositories::SqliteMetadataStore;

/// Open the blob store selected by `[storage].backend`.
pub fn open_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend.as_str() {
        "filesystem" => {
            let root = config
                .root
                .clone()
                .context("storage.root required for the filesystem backend")?;
            Ok(Arc::new(FsBlobStore::new(root)))
        }
        "s3" => Ok(Arc::new(S3BlobStore::from_config(config)?)),
        other => bail!("Unknown storage backend: {}", other),
    }
}

/// Open the metadata store, creating the schema if needed.
pub async fn open_metadata_store(config: &Config) -> Result<SqliteMetadataStore> {
    let pool = db::connect(&config.db).await?;
    migrate::migrate(&pool).await?;
    Ok(SqliteMetadataStore::new(pool))
}

/// Build a [`SyncEngine`] from configuration.
pub async fn build_engine(config: &Config) -> Result<SyncEngine> {
    let metadata = Arc::new(open_metadata_store(config).await?);
    let blobs = open_blob_store(&config.storage)?;
    let upstream = GithubClient::from_config(&config.github)?
        .map(|client| Arc::new(client) as Arc<dyn UpstreamSource>);
    let embedder = Arc::new(ProviderEmbedder::from_config(&config.embedding)?);

    info!(
        storage = %config.storage.backend,
        embedding = embedder.provider().model_name(),
        github = upstream.is_some(),
        "sync engine ready"
    );

    Ok(SyncEngine::new(
        metadata,
        blobs,
        upstream,
        embedder,
        config.sync_options(),
    ))
}

//! SQLite-backed [`MetadataStore`].
//!
//! Records live in the `repositories` table (see [`crate::migrate`]). The
//! sync claim is a single `UPDATE ... WHERE status = ?` statement, so two
//! processes sharing the database file cannot both win it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repo_index_core::models::{RepoKey, RepositoryRecord};
use repo_index_core::store::MetadataStore;
use repo_index_core::RepoStatus;

const SELECT_COLUMNS: &str =
    "SELECT owner, repo, status, last_sync_at, error_message, created_at, updated_at FROM repositories";

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<RepositoryRecord> {
    let status: String = row.get("status");
    Ok(RepositoryRecord {
        owner: row.get("owner"),
        repo: row.get("repo"),
        status: status.parse::<RepoStatus>().map_err(|e| anyhow!(e))?,
        last_sync_at: row.get("last_sync_at"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn ensure_updated(rows: u64, key: &RepoKey) -> Result<()> {
    if rows == 0 {
        return Err(anyhow!("repository {} is not registered", key));
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, key: &RepoKey) -> Result<Option<RepositoryRecord>> {
        let row = sqlx::query(&format!("{} WHERE owner = ? AND repo = ?", SELECT_COLUMNS))
            .bind(&key.owner)
            .bind(&key.repo)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<RepositoryRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY owner, repo", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn create_if_absent(&self, key: &RepoKey, now: i64) -> Result<(RepositoryRecord, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO repositories (owner, repo, status, last_sync_at, error_message, created_at, updated_at)
            VALUES (?, ?, ?, 0, NULL, ?, ?)
            ON CONFLICT(owner, repo) DO NOTHING
            "#,
        )
        .bind(&key.owner)
        .bind(&key.repo)
        .bind(RepoStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        let record = self
            .get(key)
            .await?
            .ok_or_else(|| anyhow!("repository {} vanished after insert", key))?;
        Ok((record, inserted))
    }

    async fn compare_and_set_status(
        &self,
        key: &RepoKey,
        expected: RepoStatus,
        next: RepoStatus,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE repositories SET status = ?, updated_at = ? WHERE owner = ? AND repo = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(now)
        .bind(&key.owner)
        .bind(&key.repo)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_active(&self, key: &RepoKey, last_sync_at: i64, now: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE repositories
            SET status = ?, last_sync_at = ?, error_message = NULL, updated_at = ?
            WHERE owner = ? AND repo = ?
            "#,
        )
        .bind(RepoStatus::Active.as_str())
        .bind(last_sync_at)
        .bind(now)
        .bind(&key.owner)
        .bind(&key.repo)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), key)
    }

    async fn mark_error(&self, key: &RepoKey, message: &str, now: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repositories SET status = ?, error_message = ?, updated_at = ? WHERE owner = ? AND repo = ?",
        )
        .bind(RepoStatus::Error.as_str())
        .bind(message)
        .bind(now)
        .bind(&key.owner)
        .bind(&key.repo)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), key)
    }
}

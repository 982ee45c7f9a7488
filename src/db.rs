//! SQLite pool for the repository metadata table.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::DbConfig;

/// Open (and create if missing) the metadata database at `db.path`, in WAL
/// mode with a 5s busy timeout.
pub async fn connect(db: &DbConfig) -> Result<SqlitePool> {
    if let Some(dir) = db.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create database directory: {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&db.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db.path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_nested_database() {
        let tmp = TempDir::new().unwrap();
        let db = DbConfig {
            path: tmp.path().join("nested/dir/rix.sqlite"),
        };
        let pool = connect(&db).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        pool.close().await;
        assert!(db.path.exists());
    }
}

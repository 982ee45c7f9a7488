use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per tracked repository
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            last_sync_at INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (owner, repo)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_status ON repositories(status)")
        .execute(pool)
        .await?;

    Ok(())
}

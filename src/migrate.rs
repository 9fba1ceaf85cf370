use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates the database file and schema. Safe to run repeatedly.
pub async fn init_database(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per owner; timestamps are unix seconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_configurations (
            owner_id TEXT PRIMARY KEY NOT NULL CHECK (length(trim(owner_id)) > 0),
            business_name TEXT,
            support_email TEXT,
            knowledge TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_configurations_updated_at ON chat_configurations(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Schema creation. Every statement is idempotent, so migrations run on
//! each open as well as from `rag init`.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per indexed source file (or memory:// text).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            path TEXT PRIMARY KEY,
            content_fingerprint TEXT NOT NULL,
            chunk_ids_json TEXT NOT NULL DEFAULT '[]',
            embedding_model TEXT NOT NULL DEFAULT '',
            embedding_dims INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before the embedding columns existed.
    add_column_if_missing(pool, "sources", "embedding_model", "TEXT NOT NULL DEFAULT ''").await?;
    add_column_if_missing(pool, "sources", "embedding_dims", "INTEGER NOT NULL DEFAULT 0").await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(source_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let present: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if present == 0 {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Create the schema for the database named in `config`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

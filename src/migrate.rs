//! Index schema.
//!
//! Tables:
//! - `manifest`: key/value build metadata (embedding identity, split parameters, source hash)
//! - `chunks`: chunk text and its char offsets in the document
//! - `chunk_vectors`: one little-endian f32 embedding BLOB per chunk

use sqlx::SqlitePool;

/// Bumped whenever the schema or the meaning of a manifest key changes.
pub const FORMAT_VERSION: &str = "1";

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_index INTEGER PRIMARY KEY,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            page INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_index INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_index) REFERENCES chunks(chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

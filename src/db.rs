//! SQLite connection setup for the index artifact.
//!
//! An index directory holds a single `index.sqlite` file. Builds open it
//! read-write with a rollback journal (so nothing but the one file is left
//! behind once the pool is closed); queries open it read-only.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Create (or open) the index database inside `dir`, creating `dir` if needed.
pub async fn create(dir: &Path) -> Result<SqlitePool, sqlx::Error> {
    std::fs::create_dir_all(dir)?;

    let options = SqliteConnectOptions::new()
        .filename(index_path(dir))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Open an existing index database read-only.
pub async fn open_read_only(dir: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(index_path(dir))
        .read_only(true)
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

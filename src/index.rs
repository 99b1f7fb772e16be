//! The persisted vector index: manifest, chunks, and one embedding per chunk.
//!
//! An index is written once by the indexer and loaded read-only by the query
//! engine. Search is exact: every stored vector is scored against the query
//! with [`cosine_similarity`], which is plenty for a single document.
//!
//! Ranking is by score descending, then by chunk index ascending, so equal
//! scores always come back in document order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{LoadError, QueryError};
use crate::migrate::{self, FORMAT_VERSION};
use crate::models::Chunk;

/// Build metadata stored alongside the vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexManifest {
    pub format_version: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_count: usize,
    pub source_path: String,
    pub source_sha256: String,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    /// `provider/model (N dims)`, used in mismatch messages and stats output.
    pub fn embedding_identity(&self) -> String {
        format_identity(
            &self.embedding_provider,
            &self.embedding_model,
            self.embedding_dims,
        )
    }

    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("format_version", self.format_version.clone()),
            ("embedding_provider", self.embedding_provider.clone()),
            ("embedding_model", self.embedding_model.clone()),
            ("embedding_dims", self.embedding_dims.to_string()),
            ("chunk_size", self.chunk_size.to_string()),
            ("chunk_overlap", self.chunk_overlap.to_string()),
            ("chunk_count", self.chunk_count.to_string()),
            ("source_path", self.source_path.clone()),
            ("source_sha256", self.source_sha256.clone()),
            ("built_at", self.built_at.to_rfc3339()),
        ]
    }

    fn from_map(map: &HashMap<String, String>) -> Result<Self, LoadError> {
        let get = |key: &str| {
            map.get(key)
                .cloned()
                .ok_or_else(|| LoadError::Corrupt(format!("manifest is missing '{}'", key)))
        };
        let get_usize = |key: &str| {
            get(key)?
                .parse::<usize>()
                .map_err(|e| LoadError::Corrupt(format!("manifest '{}' is not a number: {}", key, e)))
        };

        let format_version = get("format_version")?;
        if format_version != FORMAT_VERSION {
            return Err(LoadError::Corrupt(format!(
                "unsupported index format version {} (expected {})",
                format_version, FORMAT_VERSION
            )));
        }

        let built_at = DateTime::parse_from_rfc3339(&get("built_at")?)
            .map_err(|e| LoadError::Corrupt(format!("manifest 'built_at' is invalid: {}", e)))?
            .with_timezone(&Utc);

        Ok(Self {
            format_version,
            embedding_provider: get("embedding_provider")?,
            embedding_model: get("embedding_model")?,
            embedding_dims: get_usize("embedding_dims")?,
            chunk_size: get_usize("chunk_size")?,
            chunk_overlap: get_usize("chunk_overlap")?,
            chunk_count: get_usize("chunk_count")?,
            source_path: get("source_path")?,
            source_sha256: get("source_sha256")?,
            built_at,
        })
    }
}

pub fn format_identity(provider: &str, model: &str, dims: usize) -> String {
    format!("{}/{} ({} dims)", provider, model, dims)
}

/// A chunk and its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A search hit borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Assemble an index in memory. Entries are kept in chunk-index order.
    pub fn new(manifest: IndexManifest, mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by_key(|e| e.chunk.index);
        Self { manifest, entries }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// The `k` chunks most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit<'_>>, QueryError> {
        if query.len() != self.manifest.embedding_dims {
            return Err(QueryError::Retrieval(format!(
                "query vector has {} dims, index has {}",
                query.len(),
                self.manifest.embedding_dims
            )));
        }

        let mut hits: Vec<Hit<'_>> = self
            .entries
            .iter()
            .map(|e| Hit {
                chunk: &e.chunk,
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.index.cmp(&b.chunk.index))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Write the index into `dir/index.sqlite` in a single transaction.
    pub async fn write(&self, dir: &Path) -> Result<(), sqlx::Error> {
        let pool = db::create(dir).await?;
        migrate::run_migrations(&pool).await?;

        let mut tx = pool.begin().await?;
        for (key, value) in self.manifest.to_pairs() {
            sqlx::query("INSERT OR REPLACE INTO manifest (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        for entry in &self.entries {
            let chunk = &entry.chunk;
            sqlx::query(
                "INSERT INTO chunks (chunk_index, text, hash, start_offset, end_offset, page) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(chunk.index as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(chunk.page.map(|p| p as i64))
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_index, embedding) VALUES (?, ?)")
                .bind(chunk.index as i64)
                .bind(vec_to_blob(&entry.vector))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        pool.close().await;
        Ok(())
    }

    /// Read just the manifest of the index in `dir`.
    pub async fn load_manifest(dir: &Path) -> Result<IndexManifest, LoadError> {
        if !db::index_path(dir).is_file() {
            return Err(LoadError::NotFound(dir.to_path_buf()));
        }
        let pool = db::open_read_only(dir).await?;
        let manifest = read_manifest(&pool).await;
        pool.close().await;
        manifest
    }

    /// Load the index in `dir` fully into memory.
    pub async fn load(dir: &Path) -> Result<Self, LoadError> {
        if !db::index_path(dir).is_file() {
            return Err(LoadError::NotFound(dir.to_path_buf()));
        }
        let pool = db::open_read_only(dir).await?;
        let result = read_index(&pool).await;
        pool.close().await;
        let index = result?;

        tracing::info!(
            dir = %dir.display(),
            chunks = index.len(),
            embedding = %index.manifest.embedding_identity(),
            "loaded index"
        );
        Ok(index)
    }
}

async fn read_manifest(pool: &sqlx::SqlitePool) -> Result<IndexManifest, LoadError> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM manifest")
        .fetch_all(pool)
        .await?;
    let map: HashMap<String, String> = rows.into_iter().collect();
    IndexManifest::from_map(&map)
}

async fn read_index(pool: &sqlx::SqlitePool) -> Result<VectorIndex, LoadError> {
    let manifest = read_manifest(pool).await?;

    type Row = (i64, String, String, i64, i64, Option<i64>, Option<Vec<u8>>);
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT c.chunk_index, c.text, c.hash, c.start_offset, c.end_offset, c.page, v.embedding
        FROM chunks c
        LEFT JOIN chunk_vectors v ON v.chunk_index = c.chunk_index
        ORDER BY c.chunk_index ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    if rows.len() != manifest.chunk_count {
        return Err(LoadError::Corrupt(format!(
            "manifest lists {} chunks but {} are stored",
            manifest.chunk_count,
            rows.len()
        )));
    }

    let mut entries = Vec::with_capacity(rows.len());
    for (index, text, hash, start, end, page, blob) in rows {
        let blob = blob.ok_or_else(|| {
            LoadError::Corrupt(format!("chunk {} has no embedding", index))
        })?;
        let vector = blob_to_vec(&blob);
        if vector.len() != manifest.embedding_dims {
            return Err(LoadError::Corrupt(format!(
                "chunk {} embedding has {} dims, manifest says {}",
                index,
                vector.len(),
                manifest.embedding_dims
            )));
        }
        entries.push(IndexEntry {
            chunk: Chunk {
                index: index as usize,
                text,
                hash,
                start: start as usize,
                end: end as usize,
                page: page.map(|p| p as u32),
            },
            vector,
        });
    }

    Ok(VectorIndex::new(manifest, entries))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn manifest(dims: usize, chunk_count: usize) -> IndexManifest {
        IndexManifest {
            format_version: FORMAT_VERSION.to_string(),
            embedding_provider: "hash".to_string(),
            embedding_model: format!("feature-hash-{}", dims),
            embedding_dims: dims,
            chunk_size: 300,
            chunk_overlap: 50,
            chunk_count,
            source_path: "doc.txt".to_string(),
            source_sha256: "00".to_string(),
            built_at: Utc::now(),
        }
    }

    pub(crate) fn entry(index: usize, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                index,
                text: text.to_string(),
                hash: format!("h{}", index),
                start: index * 10,
                end: index * 10 + text.len(),
                page: Some(1),
            },
            vector,
        }
    }

    fn sample() -> VectorIndex {
        VectorIndex::new(
            manifest(2, 4),
            vec![
                entry(0, "east", vec![1.0, 0.0]),
                entry(1, "north", vec![0.0, 1.0]),
                entry(2, "northeast", vec![1.0, 1.0]),
                entry(3, "also east", vec![2.0, 0.0]),
            ],
        )
    }

    #[test]
    fn search_ranks_by_similarity() {
        let index = sample();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "north");
        assert_eq!(hits[1].chunk.text, "northeast");
    }

    #[test]
    fn ties_break_by_chunk_index() {
        let index = sample();
        // Chunks 0 and 3 point the same way and score identically.
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].chunk.index, 0);
        assert_eq!(hits[1].chunk.index, 3);
        assert_eq!(hits[2].chunk.index, 2);
    }

    #[test]
    fn search_is_deterministic() {
        let index = sample();
        let a: Vec<usize> = index.search(&[0.3, 0.7], 4).unwrap().iter().map(|h| h.chunk.index).collect();
        let b: Vec<usize> = index.search(&[0.3, 0.7], 4).unwrap().iter().map(|h| h.chunk.index).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        assert_eq!(sample().search(&[1.0, 0.0], 10).unwrap().len(), 4);
    }

    #[test]
    fn dims_mismatch_is_retrieval_error() {
        let err = sample().search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, QueryError::Retrieval(_)));
    }

    #[tokio::test]
    async fn write_then_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let index = sample();
        index.write(&dir).await.unwrap();

        let loaded = VectorIndex::load(&dir).await.unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.manifest().embedding_dims, 2);
        assert_eq!(
            loaded.manifest().built_at.timestamp(),
            index.manifest().built_at.timestamp()
        );
        let texts: Vec<&str> = loaded.chunks().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north", "northeast", "also east"]);

        let manifest = VectorIndex::load_manifest(&dir).await.unwrap();
        assert_eq!(manifest.chunk_count, 4);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = VectorIndex::load(&tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_detects_chunk_count_mismatch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let index = VectorIndex::new(manifest(2, 5), vec![entry(0, "east", vec![1.0, 0.0])]);
        index.write(&dir).await.unwrap();

        let err = VectorIndex::load(&dir).await.unwrap_err();
        assert!(matches!(err, LoadError::Corrupt(_)));
    }
}

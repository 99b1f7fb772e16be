//! Index build pipeline: document → chunks → embeddings → index.
//!
//! A build is a full rebuild. The new index and chunk store are both staged
//! next to their targets and moved into place only after every step has
//! succeeded. The previous index is set aside during the swap and restored
//! if the swap fails, so a failed build never leaves a partial index behind
//! and an existing index survives it untouched.
//!
//! Alongside the index, the chunk texts are written to a plain-text chunk
//! store (chunks joined by [`CHUNK_DELIMITER`]) for inspection. Nothing
//! reads it back.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::chunk::split_document;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::BuildError;
use crate::extract::load_document;
use crate::index::{IndexEntry, IndexManifest, VectorIndex};
use crate::migrate::FORMAT_VERSION;
use crate::models::Chunk;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

pub const CHUNK_DELIMITER: &str = "\n---CHUNK---\n";

/// Everything a build needs besides the embedder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub document: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub index_dir: PathBuf,
    pub chunks_path: PathBuf,
    pub batch_size: usize,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            document: config.document.path.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            index_dir: config.index.dir.clone(),
            chunks_path: config.index.chunks_path.clone(),
            batch_size: config.embedding.batch_size,
        }
    }
}

/// Summary of a completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub pages: usize,
    pub chars: usize,
    pub chunk_count: usize,
    pub index_dir: PathBuf,
    pub chunks_path: PathBuf,
    pub manifest: IndexManifest,
}

/// Build the index for `options.document`, replacing any previous index.
pub async fn build(
    options: &BuildOptions,
    embedder: &dyn Embedder,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport, BuildError> {
    let source = &options.document;
    if !source.is_file() {
        return Err(BuildError::SourceNotFound(source.clone()));
    }

    progress.report(BuildProgressEvent::Loading {
        path: source.display().to_string(),
    });
    let document = load_document(source).map_err(|e| BuildError::Extract {
        path: source.clone(),
        source: e,
    })?;
    let pages = document.page_starts.len();
    let chars = document.text.chars().count();

    progress.report(BuildProgressEvent::Chunking {
        chars: chars as u64,
    });
    let chunks = split_document(&document, options.chunk_size, options.chunk_overlap);
    if chunks.is_empty() {
        return Err(BuildError::EmptyDocument(source.clone()));
    }
    tracing::info!(
        source = %source.display(),
        pages,
        chars,
        chunks = chunks.len(),
        "document split"
    );

    let vectors = embed_chunks(&chunks, embedder, options.batch_size, progress).await?;

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION.to_string(),
        embedding_provider: embedder.provider().to_string(),
        embedding_model: embedder.model_name().to_string(),
        embedding_dims: embedder.dims(),
        chunk_size: options.chunk_size,
        chunk_overlap: options.chunk_overlap,
        chunk_count: chunks.len(),
        source_path: source.display().to_string(),
        source_sha256: document.source_sha256.clone(),
        built_at: Utc::now(),
    };
    let chunk_store = render_chunk_store(&chunks);
    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { chunk, vector })
        .collect();
    let index = VectorIndex::new(manifest.clone(), entries);

    progress.report(BuildProgressEvent::Writing {
        chunks: index.len() as u64,
    });
    let staged = stage(&index, &options.index_dir, &options.chunks_path, &chunk_store).await?;
    if let Err(e) = publish(&staged, &options.index_dir, &options.chunks_path) {
        staged.discard();
        return Err(e);
    }

    tracing::info!(
        index = %options.index_dir.display(),
        chunks = index.len(),
        "index built"
    );

    Ok(BuildReport {
        pages,
        chars,
        chunk_count: index.len(),
        index_dir: options.index_dir.clone(),
        chunks_path: options.chunks_path.clone(),
        manifest,
    })
}

/// Embed chunk texts in batches, checking one vector of the right size per chunk.
async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<Vec<Vec<f32>>, BuildError> {
    let total = chunks.len();
    let mut vectors = Vec::with_capacity(total);

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed_batch(&texts).await.map_err(|e| {
            tracing::error!(error = %e, "embedding batch failed");
            BuildError::Embedding(e)
        })?;
        if embedded.len() != texts.len() {
            return Err(BuildError::EmbeddingCount {
                expected: texts.len(),
                got: embedded.len(),
            });
        }
        if let Some(bad) = embedded.iter().find(|v| v.len() != embedder.dims()) {
            return Err(BuildError::Embedding(anyhow::anyhow!(
                "embedder returned a {}-dim vector, expected {}",
                bad.len(),
                embedder.dims()
            )));
        }
        vectors.extend(embedded);
        progress.report(BuildProgressEvent::Embedding {
            n: vectors.len() as u64,
            total: total as u64,
        });
    }

    Ok(vectors)
}

pub fn render_chunk_store(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_DELIMITER)
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!("{}.{}", name, suffix))
}

fn staging_dir(dir: &Path) -> PathBuf {
    sibling(dir, "building")
}

fn backup_dir(dir: &Path) -> PathBuf {
    sibling(dir, "previous")
}

/// Staged build output: the index directory and the chunk store file, both
/// complete but not yet visible at their final paths.
struct Staged {
    index_dir: PathBuf,
    chunk_store: PathBuf,
}

impl Staged {
    fn discard(&self) {
        let _ = std::fs::remove_dir_all(&self.index_dir);
        let _ = std::fs::remove_file(&self.chunk_store);
    }
}

/// Write the chunk store and the index next to their targets.
async fn stage(
    index: &VectorIndex,
    dir: &Path,
    chunks_path: &Path,
    chunk_store: &str,
) -> Result<Staged, BuildError> {
    if let Some(parent) = chunks_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let staged = Staged {
        index_dir: staging_dir(dir),
        chunk_store: chunks_path.with_extension("tmp"),
    };
    if staged.index_dir.exists() {
        std::fs::remove_dir_all(&staged.index_dir)?;
    }

    let written = match std::fs::write(&staged.chunk_store, chunk_store) {
        Ok(()) => index.write(&staged.index_dir).await.map_err(BuildError::from),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = written {
        staged.discard();
        return Err(e);
    }
    Ok(staged)
}

/// Move staged output into place. The previous index is set aside first and
/// restored if any later step fails, so the build either fully replaces it
/// or leaves it as it was.
fn publish(staged: &Staged, dir: &Path, chunks_path: &Path) -> Result<(), BuildError> {
    let backup = backup_dir(dir);
    if backup.exists() {
        std::fs::remove_dir_all(&backup)?;
    }
    let had_previous = dir.exists();
    if had_previous {
        std::fs::rename(dir, &backup)?;
    }

    let moved = std::fs::rename(&staged.index_dir, dir)
        .and_then(|()| std::fs::rename(&staged.chunk_store, chunks_path));
    if let Err(e) = moved {
        if dir.exists() {
            let _ = std::fs::remove_dir_all(dir);
        }
        if had_previous {
            std::fs::rename(&backup, dir)?;
        }
        return Err(e.into());
    }

    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            tracing::warn!(path = %backup.display(), error = %e, "could not remove previous index");
        }
    }
    Ok(())
}

//! Error types for index builds, index loading, queries, and generation.
//!
//! The library returns these typed errors at its public seams; the binary
//! and the HTTP server wrap them with `anyhow` context or map them onto
//! degraded answers.

use std::path::PathBuf;
use thiserror::Error;

use crate::extract::ExtractError;
use crate::models::FailureKind;

/// Errors raised while building an index. No index artifact is replaced
/// when any of these is returned.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("source document not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to extract text from {}: {source}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("document {} contains no text to index", .0.display())]
    EmptyDocument(PathBuf),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("embedder returned {got} vectors for {expected} chunks")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening an index for querying.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no index found at {}; run `askdoc build` first", .0.display())]
    NotFound(PathBuf),

    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error(
        "index was built with embedding {built} but the configured embedder is {configured}; \
         rebuild the index or change embedding settings"
    )]
    EmbeddingMismatch { built: String, configured: String },
}

/// Errors from a language-model backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

/// Errors from a single question/answer cycle.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("index contains no chunks to retrieve")]
    NoContext,

    #[error("failed to embed question: {0:#}")]
    Embedding(anyhow::Error),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl QueryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            QueryError::EmptyQuestion => FailureKind::EmptyQuestion,
            QueryError::NoContext => FailureKind::NoContext,
            QueryError::Embedding(_) => FailureKind::Embedding,
            QueryError::Retrieval(_) => FailureKind::Retrieval,
            QueryError::Generation(_) => FailureKind::Generation,
        }
    }
}

//! Core data models used throughout askdoc.
//!
//! These types represent the document, chunks, retrieved sources, and answers
//! that flow through the indexing and query pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Answer text returned when a query fails for any reason.
pub const DEGRADED_ANSWER: &str = "[Error occurred while generating the answer.]";

/// Answer the model is instructed to give when the context is insufficient.
pub const UNKNOWN_ANSWER: &str = "I don't know";

/// The full text of the source document, with page boundaries.
///
/// Pages are trimmed and joined with `"\n"`. `page_starts[i]` is the char
/// offset in `text` where page `i + 1` begins.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    /// Hex SHA-256 of the source file bytes.
    pub source_sha256: String,
    pub text: String,
    pub page_starts: Vec<usize>,
}

impl Document {
    /// 1-based page number containing the char `offset`, if the document has pages.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        if self.page_starts.is_empty() {
            return None;
        }
        let idx = self.page_starts.partition_point(|&start| start <= offset);
        Some(idx.max(1) as u32)
    }
}

/// A contiguous piece of document text, the unit of retrieval.
///
/// `start`/`end` are char offsets of the split window in the document text
/// before trimming; `text` is the trimmed window.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub hash: String,
    pub start: usize,
    pub end: usize,
    pub page: Option<u32>,
}

/// A chunk returned as supporting evidence for an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Why a query produced the degraded answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EmptyQuestion,
    NoContext,
    Embedding,
    Retrieval,
    Generation,
}

/// The result of a query: generated text plus the retrieved chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl Answer {
    pub fn degraded(kind: FailureKind) -> Self {
        Self {
            answer: DEGRADED_ANSWER.to_string(),
            sources: Vec::new(),
            failure: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the interactive conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

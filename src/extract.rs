//! Text extraction for the source document.
//!
//! PDFs are read page by page through `pdf-extract`. Plain text and Markdown
//! files are accepted as well; a form feed (`\x0c`) separates pages in them.
//! Each page is trimmed and pages are joined with a single `"\n"`, so the
//! document text matches what the indexer has always chunked.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::models::Document;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Extraction error. Never a panic; the build aborts with this instead.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Encoding(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Encoding(e) => write!(f, "document is not valid UTF-8: {}", e),
            ExtractError::Io(e) => write!(f, "failed to read document: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Guess the content type from the file extension. Unknown extensions are
/// treated as PDF, the expected input.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") => MIME_TEXT,
        Some("md") | Some("markdown") => MIME_MARKDOWN,
        _ => MIME_PDF,
    }
}

/// Split raw bytes into page texts according to `content_type`.
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    match content_type {
        MIME_PDF => pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_TEXT | MIME_MARKDOWN => {
            let text =
                std::str::from_utf8(bytes).map_err(|e| ExtractError::Encoding(e.to_string()))?;
            Ok(text.split('\x0c').map(str::to_string).collect())
        }
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Join trimmed pages with `"\n"`, recording the char offset of each page.
pub fn assemble(source: &Path, source_sha256: String, pages: &[String]) -> Document {
    let mut text = String::new();
    let mut page_starts = Vec::with_capacity(pages.len());
    let mut offset = 0usize;
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push('\n');
            offset += 1;
        }
        let page = page.trim();
        page_starts.push(offset);
        text.push_str(page);
        offset += page.chars().count();
    }
    Document {
        source: source.to_path_buf(),
        source_sha256,
        text,
        page_starts,
    }
}

/// Read, hash, and extract the document at `path`.
pub fn load_document(path: &Path) -> Result<Document, ExtractError> {
    let bytes = std::fs::read(path).map_err(ExtractError::Io)?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let pages = extract_pages(&bytes, content_type_for(path))?;
    Ok(assemble(path, sha256, &pages))
}

//! Recursive character text splitter.
//!
//! Splits the document text into [`Chunk`]s of at most `chunk_size`
//! characters, with up to `chunk_overlap` characters shared between
//! neighbouring chunks.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", ". ", " ", ""]` that
//!    occurs in the current span (`""` always matches and means "split
//!    into single characters").
//! 2. Cut the span after every occurrence of that separator, so each piece
//!    keeps its trailing separator and the pieces tile the span exactly.
//! 3. Pieces that fit in `chunk_size` are merged greedily into windows.
//!    When the next piece would overflow the window, the window is emitted
//!    and pieces are dropped from its front until at most `chunk_overlap`
//!    characters remain (and the next piece fits).
//! 4. Pieces that are too large on their own are split again with the
//!    remaining, finer separators.
//!
//! Windows are tracked as char offsets into the document and tile the whole
//! text: each window starts at or before the end of the previous one. The
//! stored chunk text is the window with surrounding whitespace trimmed;
//! windows that are entirely whitespace produce no chunk, so the only gaps
//! between consecutive chunks are whitespace.
//!
//! Lengths are counted in chars, not bytes. The splitter is a pure
//! function of `(text, chunk_size, chunk_overlap)`.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::models::{Chunk, Document};

/// Separators tried in order: paragraph, line, sentence, word, character.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Half-open char range `[start, end)` into the text being split.
type Span = (usize, usize);

/// Split `text` into chunks with contiguous indices starting at 0.
///
/// Returns no chunks for empty or whitespace-only text.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);

    let separators: Vec<Vec<char>> = SEPARATORS.iter().map(|s| s.chars().collect()).collect();
    let windows = split_span(&chars, (0, chars.len()), &separators, chunk_size, chunk_overlap);

    let mut chunks = Vec::with_capacity(windows.len());
    for (start, end) in windows {
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(make_chunk(chunks.len(), trimmed, start, end));
    }
    chunks
}

/// Split a loaded [`Document`], attaching the page each chunk starts on.
pub fn split_document(doc: &Document, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let mut chunks = split_text(&doc.text, chunk_size, chunk_overlap);
    for chunk in &mut chunks {
        chunk.page = doc.page_at(chunk.start);
    }
    chunks
}

fn split_span(
    chars: &[char],
    span: Span,
    separators: &[Vec<char>],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Span> {
    let (start, end) = span;
    if start >= end {
        return Vec::new();
    }

    // The empty separator is last and always matches.
    let level = separators
        .iter()
        .position(|sep| sep.is_empty() || find(&chars[start..end], sep).is_some())
        .unwrap_or(separators.len() - 1);
    let finer = &separators[level + 1..];
    let pieces = split_keeping_separator(chars, span, &separators[level]);

    let mut windows = Vec::new();
    let mut fitting: Vec<Span> = Vec::new();
    for piece in pieces {
        if len(piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            windows.extend(merge_spans(&fitting, chunk_size, chunk_overlap));
            fitting.clear();
        }
        if finer.is_empty() {
            // Only reachable with a single-char piece, which always fits.
            windows.push(piece);
        } else {
            windows.extend(split_span(chars, piece, finer, chunk_size, chunk_overlap));
        }
    }
    if !fitting.is_empty() {
        windows.extend(merge_spans(&fitting, chunk_size, chunk_overlap));
    }
    windows
}

/// Cut `span` after each occurrence of `separator`. The pieces tile the span.
fn split_keeping_separator(chars: &[char], span: Span, separator: &[char]) -> Vec<Span> {
    let (start, end) = span;
    if separator.is_empty() {
        return (start..end).map(|i| (i, i + 1)).collect();
    }

    let mut pieces = Vec::new();
    let mut cursor = start;
    while let Some(pos) = find(&chars[cursor..end], separator) {
        let cut = cursor + pos + separator.len();
        pieces.push((cursor, cut));
        cursor = cut;
    }
    if cursor < end {
        pieces.push((cursor, end));
    }
    pieces
}

/// Greedily merge contiguous pieces into windows of at most `chunk_size`
/// chars, carrying up to `chunk_overlap` chars into the next window.
fn merge_spans(pieces: &[Span], chunk_size: usize, chunk_overlap: usize) -> Vec<Span> {
    let mut windows = Vec::new();
    let mut current: VecDeque<Span> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let piece_len = len(piece);
        if total + piece_len > chunk_size && !current.is_empty() {
            windows.push(window_of(&current));
            while total > chunk_overlap || (total + piece_len > chunk_size && total > 0) {
                match current.pop_front() {
                    Some(front) => total -= len(front),
                    None => break,
                }
            }
        }
        current.push_back(piece);
        total += piece_len;
    }
    if !current.is_empty() {
        windows.push(window_of(&current));
    }
    windows
}

fn window_of(pieces: &VecDeque<Span>) -> Span {
    match (pieces.front(), pieces.back()) {
        (Some(first), Some(last)) => (first.0, last.1),
        _ => (0, 0),
    }
}

fn len(span: Span) -> usize {
    span.1 - span.0
}

fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn make_chunk(index: usize, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        text: text.to_string(),
        hash,
        start,
        end,
        page: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        let p1 = "The return window for most items is thirty days from delivery. \
                  Buyers must contact the seller before opening a case. \
                  Items must be returned in the original condition.";
        let p2 = "Sellers are required to ship within their stated handling time. \
                  Tracking must be uploaded for every order over ten dollars. \
                  Late shipments count against the seller performance rating.";
        let p3 = "Payments are processed by the marketplace and released to sellers \
                  after delivery is confirmed. Funds may be held for new accounts.";
        format!("{p1}\n\n{p2}\n\n{p3}")
    }

    /// Rebuild the text from chunk windows, skipping already-covered chars.
    /// Gaps are only allowed where the skipped text is whitespace.
    fn reconstruct(text: &str, chunks: &[Chunk]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut covered = 0usize;
        for chunk in chunks {
            if chunk.start > covered {
                let gap = &chars[covered..chunk.start];
                assert!(
                    gap.iter().all(|c| c.is_whitespace()),
                    "non-whitespace gap before chunk {}",
                    chunk.index
                );
                out.extend(gap);
                covered = chunk.start;
            }
            if chunk.end > covered {
                out.extend(&chars[covered..chunk.end]);
                covered = chunk.end;
            }
        }
        out.extend(&chars[covered..]);
        assert!(chars[covered..].iter().all(|c| c.is_whitespace()));
        out
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, world!", 300, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 300, 50).is_empty());
        assert!(split_text("   \n\n  ", 300, 50).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = sample();
        let a = split_text(&text, 120, 30);
        let b = split_text(&text, 120, 30);
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn test_chunk_bound() {
        let text = sample();
        for (size, overlap) in [(300, 50), (120, 30), (40, 10), (7, 3)] {
            for chunk in split_text(&text, size, overlap) {
                assert!(
                    chunk.text.chars().count() <= size,
                    "chunk {} exceeds {}: {:?}",
                    chunk.index,
                    size,
                    chunk.text
                );
                assert!(chunk.end - chunk.start <= size);
            }
        }
    }

    #[test]
    fn test_coverage() {
        let text = sample();
        for (size, overlap) in [(300, 50), (120, 30), (40, 10), (7, 3)] {
            let chunks = split_text(&text, size, overlap);
            assert_eq!(chunks.first().map(|c| c.start), Some(0));
            assert_eq!(reconstruct(&text, &chunks), text);
        }
    }

    #[test]
    fn test_overlap_bounded() {
        let text = sample();
        let chunks = split_text(&text, 60, 20);
        for pair in chunks.windows(2) {
            let shared = pair[0].end.saturating_sub(pair[1].start);
            assert!(shared <= 20, "overlap {} between {} and {}", shared, pair[0].index, pair[1].index);
        }
        assert!(chunks.windows(2).any(|p| p[0].end > p[1].start));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = sample();
        let chunks = split_text(&text, 300, 50);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].text.starts_with("Sellers are required"));
        assert!(chunks[1].text.ends_with("performance rating."));
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, 10, 2);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn test_multibyte_chars_counted_as_chars() {
        let text = "über straße café naïve ".repeat(10);
        let chunks = split_text(&text, 20, 5);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 20));
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn test_hash_is_sha256_of_text() {
        let chunks = split_text("abc", 10, 0);
        assert_eq!(
            chunks[0].hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pages_attached() {
        let doc = crate::extract::assemble(
            std::path::Path::new("doc.txt"),
            String::new(),
            &["First page text.".to_string(), "Second page text.".to_string()],
        );
        let chunks = split_document(&doc, 20, 0);
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks.last().and_then(|c| c.page), Some(2));
    }
}

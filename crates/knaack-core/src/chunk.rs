//! Recursive character text splitter.
//!
//! Splits report page text into [`Chunk`]s of at most `chunk_size`
//! characters, with `chunk_overlap` characters carried over between
//! neighbouring chunks so that sentences cut at a boundary stay
//! retrievable from either side.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs in
//!    the text (the empty separator splits into characters).
//! 2. Split on it. Pieces that fit are merged greedily into chunks; when a
//!    chunk is flushed, pieces are dropped from its front until at most
//!    `chunk_overlap` characters remain to seed the next chunk.
//! 3. Pieces longer than `chunk_size` are split recursively with the
//!    remaining, finer separators.
//!
//! Lengths count `char`s, never bytes, so multi-byte text is never cut
//! inside a code point.
//!
//! # Example
//!
//! ```rust
//! use knaack_core::chunk::split_text;
//!
//! let pieces = split_text("alpha beta gamma delta", 11, 5);
//! assert_eq!(pieces, vec!["alpha beta", "beta gamma", "gamma delta"]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split text into overlapping pieces no longer than `chunk_size` chars.
///
/// Whitespace-only pieces are dropped; every returned piece is trimmed.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let (idx, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(i, sep)| (i, *sep))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let finer = &separators[(idx + 1).min(separators.len())..];

    let splits: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    };

    let mut out = Vec::new();
    let mut good: Vec<String> = Vec::new();

    for piece in splits {
        if char_len(&piece) <= chunk_size {
            good.push(piece);
            continue;
        }
        if !good.is_empty() {
            out.extend(merge_splits(&good, separator, chunk_size, chunk_overlap));
            good.clear();
        }
        if finer.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(&piece, finer, chunk_size, chunk_overlap));
        }
    }

    if !good.is_empty() {
        out.extend(merge_splits(&good, separator, chunk_size, chunk_overlap));
    }

    out.retain(|s| !s.trim().is_empty());
    out
}

fn merge_splits(
    splits: &[String],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for piece in splits {
        let len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { sep_len };

        if total + len + joiner > chunk_size && !current.is_empty() {
            let doc = current.join(separator);
            let doc = doc.trim();
            if !doc.is_empty() {
                docs.push(doc.to_string());
            }
            while total > chunk_overlap
                || (total + len + if current.is_empty() { 0 } else { sep_len } > chunk_size
                    && total > 0)
            {
                let first = current.remove(0);
                total -= char_len(first) + if current.is_empty() { 0 } else { sep_len };
            }
        }

        if !current.is_empty() {
            total += sep_len;
        }
        current.push(piece);
        total += len;
    }

    let doc = current.join(separator);
    let doc = doc.trim();
    if !doc.is_empty() {
        docs.push(doc.to_string());
    }

    docs
}

/// Split each page of a report into chunks.
///
/// Chunk indices are contiguous across the whole report (`0..N`), and each
/// chunk remembers the zero-based page it came from. Empty pages produce no
/// chunks.
pub fn chunk_pages(
    report_id: &str,
    pages: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index: i64 = 0;
    for (page_no, page) in pages.iter().enumerate() {
        for piece in split_text(page, chunk_size, chunk_overlap) {
            chunks.push(make_chunk(report_id, index, page_no as i64, &piece));
            index += 1;
        }
    }
    chunks
}

/// SHA-256 of a chunk's text, used for embedding staleness checks.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(report_id: &str, index: i64, page: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        report_id: report_id.to_string(),
        chunk_index: index,
        page,
        text: text.to_string(),
        hash: text_hash(text),
    }
}

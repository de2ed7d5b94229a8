//! Overlapping character-window chunker.
//!
//! Splits an ingested document into fixed-size windows of `size`
//! characters, each starting `size - overlap` characters after the previous
//! one, so neighbouring chunks share `overlap` characters of context.
//!
//! Chunk ids are deterministic: the hex SHA-256 of `"<path>:<index>"`.
//! Re-ingesting the same file therefore reproduces the same ids.
//!
//! # Example
//!
//! ```rust
//! use relay_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1);
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

/// Split `text` into overlapping windows of at most `size` characters.
///
/// - `size == 0` returns the whole text as a single chunk.
/// - Windows are measured in `char`s, never splitting a code point.
/// - The window start always advances, even when `overlap >= size`.
/// - Empty text yields no chunks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 {
        return vec![text.to_string()];
    }

    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total {
        let end = (start + size).min(total);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == total {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { start + 1 };
    }
    chunks
}

/// Stable chunk id: hex SHA-256 of `"<path>:<chunk_index>"`.
pub fn chunk_id(path: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", path, chunk_index).as_bytes());
    format!("{:x}", hasher.finalize())
}

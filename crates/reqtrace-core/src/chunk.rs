//! Line-based requirement chunker.
//!
//! Splits a requirements document into fixed-size groups of non-empty lines.
//! Each group is analyzed by one independent LLM call, so the chunk size
//! bounds prompt length regardless of document size.
//!
//! # Example
//!
//! ```rust
//! use reqtrace_core::chunk::chunk_lines;
//!
//! let chunks = chunk_lines("REQ-1 a\n\nREQ-2 b\nREQ-3 c", 2);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0], vec!["REQ-1 a", "REQ-2 b"]);
//! ```

/// Default number of lines per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Split `text` on newlines, drop blank lines, and group the rest into
/// chunks of at most `chunk_size` lines.
///
/// Lines keep their original content (no trimming) so identifiers reach
/// the model verbatim. Returns no chunks for blank text. A `chunk_size`
/// of 0 is treated as 1.
pub fn chunk_lines(text: &str, chunk_size: usize) -> Vec<Vec<&str>> {
    let size = chunk_size.max(1);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty())
        .collect();
    lines.chunks(size).map(|c| c.to_vec()).collect()
}

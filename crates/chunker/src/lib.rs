//! GNO Chunker - Positional Splitting of Canonical Markdown
//!
//! Splits canonical markdown into ordered, positionally annotated chunks
//! for full-text indexing and embedding.
//!
//! # Contract
//!
//! - `seq` starts at 0 and is contiguous.
//! - Chunks are non-overlapping exact byte slices of the input; their
//!   concatenation reproduces the canonical markdown.
//! - `pos` is the byte offset of the chunk; `start_line`/`end_line` are
//!   1-based inclusive line numbers (`end_line` points at the last
//!   non-blank line of the chunk).
//! - Fenced code blocks are never split across chunks; a fence boundary is
//!   a hard split, so a fenced block always forms its own chunk and carries
//!   the fence's language tag.
//! - `token_count` is the `⌈bytes / 4⌉` estimate used when no tokenizer is
//!   bound; it is always non-negative.

mod splitter;

pub use crate::splitter::{chunk_markdown, Chunk, ChunkerConfig};

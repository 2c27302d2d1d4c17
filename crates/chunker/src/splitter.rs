//! Block scanning and chunk packing.
//!
//! The splitter runs in two passes. Pass one scans the canonical markdown
//! into *blocks*: paragraph-ish runs of lines terminated by a blank line,
//! and fenced code blocks, which are tracked separately because they must
//! never be split. Pass two packs consecutive non-fence blocks into chunks
//! up to a soft byte target; fence blocks always become chunks of their
//! own.

use serde::{Deserialize, Serialize};

/// Size targets for chunk packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Soft target: packing stops adding blocks once a chunk reaches this.
    pub target_bytes: usize,
    /// Hard ceiling: a single oversized block is split at line boundaries
    /// so no emitted chunk exceeds this (single lines longer than the
    /// ceiling are kept whole).
    pub max_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_bytes: 1600,
            max_bytes: 3200,
        }
    }
}

/// One positional unit of a canonical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based, contiguous.
    pub seq: u32,
    /// Byte offset of `text` within the canonical markdown.
    pub pos: usize,
    /// Exact byte slice of the canonical markdown.
    pub text: String,
    /// 1-based first line of the slice.
    pub start_line: u32,
    /// 1-based last non-blank line of the slice.
    pub end_line: u32,
    /// Fence language tag when the chunk is a single fenced block.
    pub language: Option<String>,
    /// `⌈bytes / 4⌉` estimate.
    pub token_count: u32,
}

#[derive(Debug)]
struct Block {
    start: usize,
    end: usize,
    start_line: u32,
    /// 0 until the block sees a non-blank line.
    last_content_line: u32,
    language: Option<String>,
    is_fence: bool,
}

impl Block {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn has_content(&self) -> bool {
        self.last_content_line != 0
    }
}

/// Split canonical markdown into chunks. See the crate docs for the
/// contract.
pub fn chunk_markdown(text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let blocks = scan_blocks(text);
    pack_blocks(text, &blocks, config)
}

#[derive(Debug, PartialEq)]
enum ScanState {
    /// No block accepting lines.
    Idle,
    /// A paragraph block is accepting lines.
    Paragraph,
    /// Inside a fence opened with the given marker.
    Fence(&'static str),
}

fn scan_blocks(text: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut state = ScanState::Idle;
    let mut offset = 0usize;
    let mut line_no = 0u32;

    for line in text.split_inclusive('\n') {
        line_no += 1;
        let start = offset;
        offset += line.len();
        let content = line.strip_suffix('\n').unwrap_or(line);
        let is_blank = content.is_empty();

        match state {
            ScanState::Fence(marker) => {
                let block = blocks.last_mut().unwrap_or_else(|| unreachable!());
                block.end = offset;
                if !is_blank {
                    block.last_content_line = line_no;
                }
                if content.trim_start().starts_with(marker) {
                    state = ScanState::Idle;
                }
            }
            _ if fence_marker(content).is_some() && !is_blank => {
                let marker = fence_marker(content).unwrap_or_else(|| unreachable!());
                blocks.push(Block {
                    start,
                    end: offset,
                    start_line: line_no,
                    last_content_line: line_no,
                    language: fence_language(content, marker),
                    is_fence: true,
                });
                state = ScanState::Fence(marker);
            }
            ScanState::Paragraph => {
                let block = blocks.last_mut().unwrap_or_else(|| unreachable!());
                block.end = offset;
                if is_blank {
                    // The separator closes the paragraph and belongs to it.
                    state = ScanState::Idle;
                } else {
                    block.last_content_line = line_no;
                }
            }
            ScanState::Idle => {
                if is_blank {
                    // Blank with nothing open: attach to the previous block
                    // so coverage stays exact; at document start it opens
                    // the first block instead.
                    match blocks.last_mut() {
                        Some(block) => block.end = offset,
                        None => {
                            blocks.push(Block {
                                start,
                                end: offset,
                                start_line: line_no,
                                last_content_line: 0,
                                language: None,
                                is_fence: false,
                            });
                            state = ScanState::Paragraph;
                        }
                    }
                } else {
                    blocks.push(Block {
                        start,
                        end: offset,
                        start_line: line_no,
                        last_content_line: line_no,
                        language: None,
                        is_fence: false,
                    });
                    state = ScanState::Paragraph;
                }
            }
        }
    }

    blocks
}

fn fence_marker(content: &str) -> Option<&'static str> {
    let trimmed = content.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn fence_language(content: &str, marker: &str) -> Option<String> {
    let info = content.trim_start().trim_start_matches(|c: char| {
        marker.starts_with(c) && (c == '`' || c == '~')
    });
    let language = info.trim().split_whitespace().next()?;
    Some(language.to_string())
}

fn pack_blocks(text: &str, blocks: &[Block], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut run: Vec<&Block> = Vec::new();
    let mut run_size = 0usize;

    let mut flush = |run: &mut Vec<&Block>, run_size: &mut usize, chunks: &mut Vec<Chunk>| {
        if run.is_empty() {
            return;
        }
        let first = run[0];
        let last = run[run.len() - 1];
        emit(text, first.start, last.end, first.start_line, run_end_line(run), None, chunks);
        run.clear();
        *run_size = 0;
    };

    for block in blocks {
        if !block.has_content() {
            // Blank-only block (whitespace-only document): nothing to index.
            continue;
        }

        if block.is_fence {
            flush(&mut run, &mut run_size, &mut chunks);
            emit(
                text,
                block.start,
                block.end,
                block.start_line,
                block.last_content_line,
                block.language.clone(),
                &mut chunks,
            );
            continue;
        }

        if block.len() > config.max_bytes {
            flush(&mut run, &mut run_size, &mut chunks);
            split_oversized(text, block, config.max_bytes, &mut chunks);
            continue;
        }

        if run_size > 0 && run_size + block.len() > config.target_bytes {
            flush(&mut run, &mut run_size, &mut chunks);
        }
        run_size += block.len();
        run.push(block);
    }
    flush(&mut run, &mut run_size, &mut chunks);

    chunks
}

fn run_end_line(run: &[&Block]) -> u32 {
    run.iter()
        .rev()
        .find(|b| b.has_content())
        .map(|b| b.last_content_line)
        .unwrap_or_else(|| run[run.len() - 1].start_line)
}

/// Split a block larger than the ceiling at line boundaries.
fn split_oversized(text: &str, block: &Block, max_bytes: usize, chunks: &mut Vec<Chunk>) {
    let slice = &text[block.start..block.end];
    let mut piece_start = block.start;
    let mut piece_start_line = block.start_line;
    let mut piece_last_content = 0u32;
    let mut offset = block.start;
    let mut line_no = block.start_line - 1;

    for line in slice.split_inclusive('\n') {
        line_no += 1;
        let would_be = offset + line.len() - piece_start;
        if would_be > max_bytes && offset > piece_start {
            let end_line = if piece_last_content == 0 { piece_start_line } else { piece_last_content };
            emit(text, piece_start, offset, piece_start_line, end_line, None, chunks);
            piece_start = offset;
            piece_start_line = line_no;
            piece_last_content = 0;
        }
        if !line.trim_end_matches('\n').is_empty() {
            piece_last_content = line_no;
        }
        offset += line.len();
    }
    if offset > piece_start {
        let end_line = if piece_last_content == 0 { piece_start_line } else { piece_last_content };
        emit(text, piece_start, offset, piece_start_line, end_line, None, chunks);
    }
}

fn emit(
    text: &str,
    start: usize,
    end: usize,
    start_line: u32,
    end_line: u32,
    language: Option<String>,
    chunks: &mut Vec<Chunk>,
) {
    let body = &text[start..end];
    chunks.push(Chunk {
        seq: chunks.len() as u32,
        pos: start,
        text: body.to_string(),
        start_line,
        end_line,
        language,
        token_count: body.len().div_ceil(4) as u32,
    });
}

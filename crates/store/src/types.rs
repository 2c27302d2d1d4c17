//! Persistent row types, operation inputs, and query results.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// URI scheme for stored documents.
pub const URI_SCHEME: &str = "gno";

/// Derive the document URI for a `(collection, rel_path)` pair.
pub fn document_uri(collection: &str, rel_path: &str) -> String {
    format!("{URI_SCHEME}://{collection}/{rel_path}")
}

/// The composite document key used by the documents table.
pub fn document_key(collection: &str, rel_path: &str) -> String {
    format!("{collection}\x00{rel_path}")
}

pub(crate) fn split_document_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('\x00')
}

/// Derive the base 8-hex docid for a `(collection, rel_path)` pair.
///
/// Collisions are resolved at insert time by sliding the window one hex
/// character forward; a docid is never re-derived once issued.
pub fn derive_docid(collection: &str, rel_path: &str, window: usize) -> String {
    let digest = canonical::mirror_hash_bytes(document_key(collection, rel_path).as_bytes());
    let start = window.min(digest.len() - 8);
    digest[start..start + 8].to_string()
}

/// Collection names are `[a-z0-9][a-z0-9_-]*`.
pub fn is_valid_collection(name: &str) -> bool {
    links::is_valid_collection(name)
}

/// Metadata row for a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRow {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Input to `upsert_document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub collection: String,
    pub rel_path: String,
    /// SHA-256 of the raw source bytes.
    pub source_hash: String,
    pub source_mime: String,
    pub source_ext: String,
    pub source_size: u64,
    pub source_mtime: Option<DateTime<Utc>>,
    pub mirror_hash: Option<String>,
    pub title: Option<String>,
    pub converter_id: Option<String>,
    pub converter_version: Option<u32>,
    pub language_hint: Option<String>,
}

/// Last recorded per-document failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A stored document row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Surrogate id, unique per row.
    pub id: u64,
    /// 8-hex short identifier; stable across re-ingests.
    pub docid: String,
    pub collection: String,
    pub rel_path: String,
    pub uri: String,
    pub source_hash: String,
    pub source_mime: String,
    pub source_ext: String,
    pub source_size: u64,
    pub source_mtime: Option<DateTime<Utc>>,
    pub mirror_hash: Option<String>,
    pub title: Option<String>,
    pub converter_id: Option<String>,
    pub converter_version: Option<u32>,
    pub language_hint: Option<String>,
    /// False means tombstoned but retained for history.
    pub active: bool,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content-addressed canonical markdown row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRow {
    pub markdown: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chunk of a content row. Keyed by `(mirror_hash, seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub seq: u32,
    /// Byte offset into the canonical markdown.
    pub pos: u64,
    pub text: String,
    /// 1-based inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub language: Option<String>,
    pub token_count: Option<u32>,
}

impl From<chunker::Chunk> for ChunkRecord {
    fn from(chunk: chunker::Chunk) -> Self {
        Self {
            seq: chunk.seq,
            pos: chunk.pos as u64,
            text: chunk.text,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            language: chunk.language,
            token_count: Some(chunk.token_count),
        }
    }
}

/// Durable vector row. Keyed by `(mirror_hash, seq, model)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRow {
    /// Little-endian f32 bytes, `dimensions * 4` long.
    pub embedding: Vec<u8>,
    pub embedded_at: DateTime<Utc>,
}

/// Input to `upsert_vectors`.
#[derive(Debug, Clone)]
pub struct VectorInput {
    pub mirror_hash: String,
    pub seq: u32,
    pub vector: Vec<f32>,
}

/// Outcome of `upsert_vectors`: durable writes always cover the whole
/// batch; side-index writes are tracked per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorUpsertReport {
    pub stored: usize,
    pub side_index_ok: usize,
    pub side_index_failed: usize,
}

/// One full-text hit, hydrated with its document identity.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub mirror_hash: String,
    pub seq: u32,
    /// Negated BM25: more negative = better. Pre-sorted ascending.
    pub score: f64,
    pub docid: String,
    pub uri: String,
    pub title: Option<String>,
    pub collection: String,
    pub rel_path: String,
}

/// Options for `search_fts`.
#[derive(Debug, Clone, Default)]
pub struct FtsSearchOptions {
    pub collection: Option<String>,
    pub limit: usize,
}

/// One nearest-neighbor hit from the vector side-index.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestHit {
    pub mirror_hash: String,
    pub seq: u32,
    /// Cosine distance, ascending (smaller = closer).
    pub distance: f32,
}

/// Filters for `search_nearest`.
#[derive(Debug, Clone, Default)]
pub struct NearestFilters {
    pub collection: Option<String>,
}

/// One unembedded chunk, in backlog cursor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogItem {
    pub mirror_hash: String,
    pub seq: u32,
    pub text: String,
    /// Title of a document referring to this content, for contextual
    /// embedding formatting.
    pub title: Option<String>,
}

/// A backlink: a stored link plus the identity of the document holding it.
#[derive(Debug, Clone)]
pub struct Backlink {
    pub source_docid: String,
    pub source_uri: String,
    pub link: links::ExtractedLink,
}

/// Append-only ingest diagnostic row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestErrorRow {
    pub collection: String,
    pub rel_path: String,
    pub occurred_at: DateTime<Utc>,
    pub code: String,
    pub message: String,
    /// JSON-encoded details, `null` when absent.
    pub details_json: String,
}

/// What `cleanup_orphans` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub documents_removed: usize,
    pub content_removed: usize,
    pub chunks_removed: usize,
    pub vectors_removed: usize,
    pub fts_rows_removed: usize,
}

/// Batched chunk results with a lazily derived `(hash, seq) → chunk`
/// lookup.
///
/// The per-hash index is built on first access and kept for the lifetime
/// of the lookup. Duplicate `seq` values keep the first occurrence.
pub struct ChunkLookup {
    by_hash: HashMap<String, Vec<ChunkRecord>>,
    maps: Mutex<HashMap<String, HashMap<u32, usize>>>,
}

impl ChunkLookup {
    pub fn new(by_hash: HashMap<String, Vec<ChunkRecord>>) -> Self {
        Self {
            by_hash,
            maps: Mutex::new(HashMap::new()),
        }
    }

    /// O(1) after the first access for a hash.
    pub fn get(&self, mirror_hash: &str, seq: u32) -> Option<&ChunkRecord> {
        let chunks = self.by_hash.get(mirror_hash)?;
        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        let map = maps.entry(mirror_hash.to_string()).or_insert_with(|| {
            let mut m = HashMap::with_capacity(chunks.len());
            for (idx, chunk) in chunks.iter().enumerate() {
                // First-wins on duplicate seq.
                m.entry(chunk.seq).or_insert(idx);
            }
            m
        });
        let idx = *map.get(&seq)?;
        chunks.get(idx)
    }

    pub fn chunks_for(&self, mirror_hash: &str) -> Option<&[ChunkRecord]> {
        self.by_hash.get(mirror_hash).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u32, text: &str) -> ChunkRecord {
        ChunkRecord {
            seq,
            pos: 0,
            text: text.to_string(),
            start_line: 1,
            end_line: 1,
            language: None,
            token_count: Some(1),
        }
    }

    #[test]
    fn docid_is_stable_and_8_hex() {
        let a = derive_docid("notes", "a/b.md", 0);
        let b = derive_docid("notes", "a/b.md", 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, derive_docid("notes", "a/c.md", 0));
        assert_ne!(a, derive_docid("notes", "a/b.md", 1));
    }

    #[test]
    fn uri_shape() {
        assert_eq!(document_uri("notes", "a/b.md"), "gno://notes/a/b.md");
    }

    #[test]
    fn document_key_roundtrip() {
        let key = document_key("notes", "a/b.md");
        assert_eq!(split_document_key(&key), Some(("notes", "a/b.md")));
    }

    #[test]
    fn chunk_lookup_first_wins_on_duplicate_seq() {
        let mut by_hash = HashMap::new();
        by_hash.insert(
            "h1".to_string(),
            vec![chunk(0, "first"), chunk(0, "duplicate"), chunk(1, "second")],
        );
        let lookup = ChunkLookup::new(by_hash);

        assert_eq!(lookup.get("h1", 0).unwrap().text, "first");
        assert_eq!(lookup.get("h1", 1).unwrap().text, "second");
        assert!(lookup.get("h1", 2).is_none());
        assert!(lookup.get("missing", 0).is_none());
    }
}

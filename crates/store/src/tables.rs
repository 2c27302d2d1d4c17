//! redb table definitions and key-range helpers.
//!
//! Table names and key layouts are part of the on-disk contract; renaming
//! a table or reordering key components is a schema migration.

use redb::TableDefinition;

/// Store metadata: schema version, tokenizer, counters.
pub(crate) const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Collection name → bincode `CollectionRow`.
pub(crate) const COLLECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");

/// `"{collection}\x00{rel_path}"` → bincode `DocumentRow`.
pub(crate) const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// docid → document key.
pub(crate) const DOCIDS: TableDefinition<&str, &str> = TableDefinition::new("docids");

/// mirror_hash → bincode `ContentRow`.
pub(crate) const CONTENT: TableDefinition<&str, &[u8]> = TableDefinition::new("content");

/// `(mirror_hash, document key)` → (). Reverse mapping used for hit
/// hydration and orphan detection.
pub(crate) const CONTENT_DOCS: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("content_docs");

/// `(mirror_hash, seq)` → bincode `ChunkRecord`.
pub(crate) const CHUNKS: TableDefinition<(&str, u32), &[u8]> = TableDefinition::new("chunks");

/// `(term, mirror_hash, seq)` → term frequency.
pub(crate) const FTS_POSTINGS: TableDefinition<(&str, &str, u32), u32> =
    TableDefinition::new("fts_postings");

/// `(mirror_hash, seq)` → token count. Row presence defines FTS
/// membership; `len()` is the BM25 document count.
pub(crate) const FTS_CHUNKS: TableDefinition<(&str, u32), u32> =
    TableDefinition::new("fts_chunks");

/// `(mirror_hash, seq, model)` → bincode `VectorRow`.
pub(crate) const VECTORS: TableDefinition<(&str, u32, &str), &[u8]> =
    TableDefinition::new("vectors");

/// `(source docid, ordinal)` → bincode `ExtractedLink`.
pub(crate) const LINKS: TableDefinition<(&str, u32), &[u8]> = TableDefinition::new("links");

/// `(target_ref_norm, source docid, ordinal)` → (). Backlink index.
pub(crate) const LINK_NORMS: TableDefinition<(&str, &str, u32), ()> =
    TableDefinition::new("link_norms");

/// `(document key, global seq)` → bincode `IngestErrorRow`. Append-only.
pub(crate) const INGEST_ERRORS: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("ingest_errors");

pub(crate) mod meta_keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const FTS_TOKENIZER: &str = "fts_tokenizer";
    pub const FTS_TOTAL_TOKENS: &str = "fts_total_tokens";
    pub const NEXT_DOC_ID: &str = "next_doc_id";
    pub const INGEST_ERROR_SEQ: &str = "ingest_error_seq";
}

/// The smallest string strictly greater than every string with prefix
/// `s` == `s` itself; used as an exclusive upper bound for prefix ranges
/// over tuple keys whose first component equals `s`.
pub(crate) fn str_successor(s: &str) -> String {
    format!("{s}\0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_orders_directly_after_prefix() {
        let s = "abc";
        let next = str_successor(s);
        assert!(s < next.as_str());
        assert!(next.as_str() < "abca");
        assert!(next.as_str() <= "abc\0");
    }
}

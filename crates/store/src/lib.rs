//! # GNO Store
//!
//! Content-addressed persistence for the retrieval engine: documents,
//! canonical content, chunks, full-text postings, embedding vectors,
//! links, and the ingest-error journal: all in one embedded ACID
//! database (redb), with an in-process HNSW side-index mirroring the
//! durable vector table.
//!
//! ## Shape
//!
//! - Every logical operation is one write transaction; readers see either
//!   the pre- or post-state, never a torn write.
//! - Content is keyed by *mirror hash* (SHA-256 of canonical markdown), so
//!   identical documents deduplicate naturally.
//! - The full-text index is an inverted postings table scored with BM25.
//!   The store's score convention is **negated BM25: more negative =
//!   better**, pre-sorted ascending.
//! - The vector side-index is a derived view. Durable writes never depend
//!   on it; divergence is tracked by a per-instance dirty flag and healed
//!   by [`Store::sync_vec_index`].
//!
//! ## Quick start
//!
//! ```no_run
//! use store::{FtsTokenizer, Store, StoreOptions, VecIndexOptions};
//!
//! let store = Store::open(
//!     "/tmp/gno.redb",
//!     StoreOptions::new(
//!         FtsTokenizer::Unicode61,
//!         VecIndexOptions::new("builtin:minilm", 384),
//!     ),
//! )?;
//! let hits = store.search_fts("ownership", &Default::default())?;
//! # Ok::<(), store::StoreError>(())
//! ```

mod content;
mod docs;
mod error;
mod fts;
mod links_ops;
mod maintenance;
mod store;
mod tables;
mod types;
mod vec;
mod vectors;

pub use crate::error::{StoreError, StoreResult};
pub use crate::fts::{bm25_term, FtsTokenizer};
pub use crate::store::{Store, StoreOptions, SCHEMA_VERSION};
pub use crate::types::{
    derive_docid, document_key, document_uri, is_valid_collection, Backlink, BacklogItem,
    ChunkLookup, ChunkRecord, CleanupReport, CollectionRow, ContentRow, DocumentInput,
    DocumentRow, FtsHit, FtsSearchOptions, IngestErrorRow, LastError, NearestFilters, NearestHit,
    VectorInput, VectorRow, VectorUpsertReport, URI_SCHEME,
};
pub use crate::vec::{
    cosine_distance, decode_vector, encode_vector, l2_normalize, VecIndexError, VecIndexOptions,
    VecKey, VectorIndex,
};

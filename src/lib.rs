//! # GNO: Local-First Knowledge Retrieval
//!
//! Umbrella crate for the GNO retrieval and indexing core. It re-exports
//! the stage crates and drives them end-to-end through [`Engine`]:
//!
//! ```text
//! write path:  discover ─▶ detect ─▶ convert ─▶ canonicalize ─▶ store
//!                         (convert)            (canonical)    (store)
//!              ─▶ chunk ─▶ full-text rows ─▶ links ─▶ embed backlog
//!               (chunker)     (store)       (links)    (embed)
//!
//! read path:   query ─▶ expand ─▶ { BM25 ∥ vector } ─▶ fuse ─▶ rerank
//!                        (search)
//!              plus links / backlinks / similar   (graph)
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use gno::{Engine, EngineConfig, ModelPorts};
//!
//! # async fn demo() -> Result<(), gno::EngineError> {
//! let config = EngineConfig::rooted_at("/home/me/.gno").with_env_overrides()?;
//! let engine = Engine::open(config, ModelPorts::default()).await?;
//!
//! engine
//!     .ingest("notes", "intro.md", b"# Intro\n\nHello.".to_vec(), None)
//!     .await?;
//! let results = engine.query("hello", &Default::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Collaborators
//!
//! Front-ends (CLI, web UI, MCP adapters), filesystem discovery, config
//! loading, and the model runtime are collaborators behind narrow
//! seams: discovery feeds [`Engine::ingest`], the model runtime plugs in
//! through [`ModelPorts`], and front-ends consume the public operations
//! plus [`EngineError::exit_code`].
//!
//! ## Error taxonomy
//!
//! Every error carries a stable `code()` out of: `VALIDATION`,
//! `NOT_FOUND`, `UNSUPPORTED`, `TOO_LARGE`, `TIMEOUT`, `CORRUPT`,
//! `PERMISSION`, `IO`, `ADAPTER_FAILURE`, `QUERY_FAILED`,
//! `VEC_UNAVAILABLE`, `VEC_SYNC_FAILED`, `RUNTIME`, `INTERNAL`.

mod config;
mod engine;
mod error;

pub use crate::config::{
    EngineConfig, ModelPreset, ENV_CONFIG_DIR, ENV_DATA_DIR, ENV_MODEL_CACHE_DIR,
};
pub use crate::engine::{Engine, HybridOptions, ModelPorts, SearchOptions};
pub use crate::error::EngineError;

pub use canonical::{canonicalize, mirror_hash, mirror_hash_bytes};
pub use chunker::{chunk_markdown, Chunk, ChunkerConfig};
pub use convert::{
    ConversionArtifact, ConvertError, ConvertErrorKind, ConvertInput, ConvertLimits,
    ConvertPipeline, Converter, ConverterOutput, ConverterRegistry, MimeDetector, MimeGuess,
};
pub use embed::{
    BacklogOptions, BacklogProcessor, BacklogReport, EmbedError, Embedder, Generator, Reranker,
    StubEmbedder,
};
pub use graph::{GraphAccessor, GraphError, OutgoingLink, SimilarDocument, SimilarOptions};
pub use links::{extract_links, normalize_ref, ExtractedLink, LinkSource, LinkType};
pub use search::{
    Expansion, HybridSearcher, QueryExpander, RankedResult, SearchConfig, SearchError, SnippetRange,
    SourceInfo,
};
pub use store::{
    Backlink, BacklogItem, ChunkRecord, CleanupReport, DocumentInput, DocumentRow, FtsHit,
    FtsTokenizer, IngestErrorRow, NearestHit, Store, StoreError, StoreOptions, VecIndexOptions,
    VectorIndex, VectorInput,
};

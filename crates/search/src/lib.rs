//! GNO Search - The Hybrid Retrieval Pipeline
//!
//! ```text
//! query ──▶ expand ──▶ { BM25 variants ∥ vector variants + HyDE } ──▶ RRF ──▶ rerank ──▶ results
//!           (C10)            (C11)            (C12)                   (C13)
//! ```
//!
//! - **Expansion** asks the generator port for lexical variants, semantic
//!   rephrasings, and a hypothetical answer passage, validated against a
//!   strict schema; anything non-conforming falls back to the identity
//!   expansion.
//! - **Lexical search** runs one BM25 query per variant and hydrates
//!   chunks through a single batched fetch (per-hash fetches are an N+1
//!   regression).
//! - **Vector search** embeds each variant plus the HyDE passage and runs
//!   k-NN over the vector side-index.
//! - **Fusion** merges all candidate lists with Reciprocal Rank Fusion
//!   (`k = 60`), reranks the top candidates with the cross-encoder port,
//!   and blends: `final = α·rerank + (1-α)·rrf_norm`, `α = 0.7`.
//!
//! Degradation is graceful and logged: a missing or failing embedder
//! drops the vector lists, a failing reranker falls back to pure RRF, a
//! failing expander falls back to the identity expansion. Scores leaving
//! this crate are always in `[0, 1]`.

mod error;
mod expand;
mod fusion;
mod lexical;
mod searcher;
mod types;
mod vector;

pub use crate::error::SearchError;
pub use crate::expand::{Expansion, QueryExpander};
pub use crate::fusion::{fuse_rrf, min_max_normalize, FusedCandidate, DEFAULT_RRF_K};
pub use crate::lexical::{build_snippet, normalize_bm25_score, search_lexical_lists};
pub use crate::searcher::{HybridSearcher, QueryOptions, SearchConfig};
pub use crate::types::{RankedResult, SearchCandidate, SnippetRange, SourceInfo};
pub use crate::vector::search_vector_lists;

//! The hybrid searcher: expansion → parallel retrieval → fusion →
//! reranking, with graceful degradation at every optional stage.

use std::sync::Arc;

use embed::{Embedder, Generator, Reranker};
use store::Store;

use crate::error::SearchError;
use crate::expand::{Expansion, QueryExpander};
use crate::fusion::{fuse_rrf, min_max_normalize, FusedCandidate, DEFAULT_RRF_K};
use crate::lexical::{build_snippet, search_lexical_lists};
use crate::types::{RankedResult, SnippetRange, SourceInfo};
use crate::vector::search_vector_lists;

/// Ranking knobs with the contract defaults.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// RRF constant.
    pub rrf_k: f64,
    /// Candidates passed to the cross-encoder.
    pub rerank_candidates: usize,
    /// Rerank weight in the blend `α·rerank + (1-α)·rrf_norm`.
    pub alpha: f64,
    /// Per-variant over-fetch multiplier applied to the requested limit.
    pub fetch_multiplier: usize,
    /// Snippet length budget in characters.
    pub snippet_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            rerank_candidates: 20,
            alpha: 0.7,
            fetch_multiplier: 2,
            snippet_chars: 240,
        }
    }
}

/// Per-query options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub collection: Option<String>,
    pub limit: usize,
    /// Run query expansion (needs a generator port).
    pub expand: bool,
    /// Run cross-encoder reranking (needs a reranker port).
    pub rerank: bool,
    /// Minimum similarity for vector-only search.
    pub threshold: Option<f32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            collection: None,
            limit: 10,
            expand: true,
            rerank: true,
            threshold: None,
        }
    }
}

/// Composes the full read path over a store and the model-runtime ports.
///
/// Ports are optional: without an embedder the searcher is BM25-only,
/// without a generator queries run unexpanded, without a reranker fusion
/// output is final.
pub struct HybridSearcher {
    store: Arc<Store>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
    expander: Option<QueryExpander>,
    config: SearchConfig,
}

impl HybridSearcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            embedder: None,
            reranker: None,
            expander: None,
            config: SearchConfig::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.expander = Some(QueryExpander::new(generator));
        self
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn has_vector_search(&self) -> bool {
        self.embedder.is_some() && self.store.vec_index().search_available()
    }

    /// BM25-only search.
    pub fn search_bm25(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<RankedResult>, SearchError> {
        let variants = vec![query.to_string()];
        let lists = search_lexical_lists(
            &self.store,
            &variants,
            options.collection.as_deref(),
            options.limit.max(1),
        )?;
        let candidates = lists.into_iter().next().unwrap_or_default();
        let terms = vec![query.to_string()];
        candidates
            .into_iter()
            .take(options.limit.max(1))
            .map(|c| {
                let score = c.score;
                self.assemble(c, score, &terms)
            })
            .collect()
    }

    /// Vector-only search.
    pub async fn search_vector(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<RankedResult>, SearchError> {
        let embedder = self
            .embedder
            .as_deref()
            .ok_or(store::StoreError::VecUnavailable)
            .map_err(SearchError::from)?;
        let variants = vec![query.to_string()];
        let lists = search_vector_lists(
            &self.store,
            embedder,
            &variants,
            "",
            options.collection.as_deref(),
            options.limit.max(1),
            options.threshold,
        )
        .await?;
        let candidates = lists.into_iter().next().unwrap_or_default();
        let terms = vec![query.to_string()];
        candidates
            .into_iter()
            .take(options.limit.max(1))
            .map(|c| {
                let score = c.score;
                self.assemble(c, score, &terms)
            })
            .collect()
    }

    /// The full hybrid pipeline.
    pub async fn query(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<RankedResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("empty query".into()));
        }
        let limit = options.limit.max(1);
        let fetch = limit * self.config.fetch_multiplier.max(1);

        // C10: expansion, falling back to identity on any failure.
        let expansion = match (&self.expander, options.expand) {
            (Some(expander), true) => match expander.expand(query).await {
                Ok(expansion) => expansion,
                Err(err) => {
                    tracing::warn!(error = %err, "query expansion failed; using identity expansion");
                    Expansion::identity(query)
                }
            },
            _ => Expansion::identity(query),
        };

        // C11: one BM25 list per lexical variant.
        let mut lists = search_lexical_lists(
            &self.store,
            &expansion.lexical_queries,
            options.collection.as_deref(),
            fetch,
        )?;

        // C12: one vector list per variant plus HyDE; vector failures
        // degrade to lexical-only.
        if let Some(embedder) = self.embedder.as_deref() {
            match search_vector_lists(
                &self.store,
                embedder,
                &expansion.vector_queries,
                &expansion.hyde_passage,
                options.collection.as_deref(),
                fetch,
                None,
            )
            .await
            {
                Ok(vector_lists) => lists.extend(vector_lists),
                Err(err) => {
                    tracing::warn!(error = %err, "vector search failed; continuing with BM25 only");
                }
            }
        }

        // C13: fusion, then reranking over the top candidates.
        let mut fused = fuse_rrf(&lists, self.config.rrf_k);
        fused.truncate(self.config.rerank_candidates.max(limit));
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let rrf_scores: Vec<f64> = fused.iter().map(|f| f.rrf_score).collect();
        let rrf_norm = min_max_normalize(&rrf_scores);

        let final_scores: Vec<f64> = match (&self.reranker, options.rerank) {
            (Some(reranker), true) => {
                let texts: Vec<String> = fused.iter().map(|f| f.candidate.text.clone()).collect();
                match reranker.rerank(query, &texts).await {
                    Ok(scores) if scores.len() == fused.len() => fused
                        .iter()
                        .zip(rrf_norm.iter())
                        .zip(scores.iter())
                        .map(|((_, rrf), rerank)| {
                            let rerank = (*rerank as f64).clamp(0.0, 1.0);
                            self.config.alpha * rerank + (1.0 - self.config.alpha) * rrf
                        })
                        .collect(),
                    Ok(scores) => {
                        tracing::warn!(
                            expected = fused.len(),
                            got = scores.len(),
                            "reranker returned wrong count; using fusion scores"
                        );
                        rrf_norm.clone()
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "reranker failed; using fusion scores");
                        rrf_norm.clone()
                    }
                }
            }
            _ => rrf_norm.clone(),
        };

        // Order by blended score; ties fall back to the fused ordering
        // (earlier RRF rank, then docid), which `fused` already encodes.
        let mut order: Vec<usize> = (0..fused.len()).collect();
        order.sort_by(|&a, &b| {
            final_scores[b]
                .partial_cmp(&final_scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });

        let terms = expansion.lexical_queries.clone();
        order
            .into_iter()
            .take(limit)
            .map(|idx| {
                let FusedCandidate { candidate, .. } = fused[idx].clone();
                self.assemble(candidate, final_scores[idx], &terms)
            })
            .collect()
    }

    fn assemble(
        &self,
        candidate: crate::types::SearchCandidate,
        score: f64,
        terms: &[String],
    ) -> Result<RankedResult, SearchError> {
        let doc = self
            .store
            .get_document(&candidate.collection, &candidate.rel_path)?;
        let (mime, ext, size_bytes) = match doc {
            Some(doc) => (doc.source_mime, doc.source_ext, Some(doc.source_size)),
            None => (String::new(), String::new(), None),
        };
        Ok(RankedResult {
            docid: format!("#{}", candidate.docid),
            score: score.clamp(0.0, 1.0),
            uri: candidate.uri,
            snippet: build_snippet(&candidate.text, terms, self.config.snippet_chars),
            source: SourceInfo {
                rel_path: candidate.rel_path,
                mime,
                ext,
                size_bytes,
            },
            snippet_range: Some(SnippetRange {
                start_line: candidate.start_line,
                end_line: candidate.end_line,
            }),
        })
    }
}

//! The engine: write-path orchestration and the public operation surface.
//!
//! Write path: detect → convert → canonicalize → store (document +
//! content) → chunk → full-text rows → links → (separately) the
//! embedding backlog. Every stage is idempotent keyed by the content
//! hash, so re-ingesting unchanged bytes is a cheap no-op.
//!
//! Read path: query → expansion → BM25 ∥ vector → fusion → rerank, all
//! delegated to [`search::HybridSearcher`]; graph lookups go through
//! [`graph::GraphAccessor`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use store::{DocumentInput, DocumentRow, Store, StoreOptions, VecIndexOptions};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// The model-runtime collaborators. All optional: the engine degrades to
/// lexical-only retrieval without them.
#[derive(Default, Clone)]
pub struct ModelPorts {
    pub embedder: Option<Arc<dyn embed::Embedder>>,
    pub reranker: Option<Arc<dyn embed::Reranker>>,
    pub generator: Option<Arc<dyn embed::Generator>>,
}

/// Options for the search operations.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub collection: Option<String>,
    pub limit: usize,
    /// Vector-only: drop hits below this similarity.
    pub threshold: Option<f32>,
}

/// Options for the hybrid `query` operation.
#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub collection: Option<String>,
    pub limit: usize,
    pub expand: bool,
    pub rerank: bool,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            collection: None,
            limit: 10,
            expand: true,
            rerank: true,
        }
    }
}

/// The retrieval and indexing core behind every front-end.
pub struct Engine {
    config: EngineConfig,
    store: Arc<Store>,
    pipeline: Arc<convert::ConvertPipeline>,
    detector: convert::MimeDetector,
    ports: ModelPorts,
    searcher: search::HybridSearcher,
    graph: graph::GraphAccessor,
}

impl Engine {
    /// Open the engine: create the data directory, open the store (with
    /// migrations), rebuild the full-text index if the configured
    /// tokenizer changed, and reconcile the vector side-index after a
    /// restart.
    pub async fn open(config: EngineConfig, ports: ModelPorts) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let vec_options = if config.vec_search_enabled {
            VecIndexOptions::new(config.model.model_uri.clone(), config.model.dimensions)
        } else {
            VecIndexOptions::disabled(config.model.model_uri.clone(), config.model.dimensions)
        };
        let store = Arc::new(Store::open(
            config.store_path(),
            StoreOptions::new(config.tokenizer, vec_options),
        )?);

        if store.needs_fts_rebuild() {
            tracing::info!("tokenizer changed; rebuilding the full-text index");
            store.rebuild_fts()?;
        }
        if store.vec_index().search_available() && store.needs_vec_sync()? {
            if let Err(err) = store.sync_vec_index() {
                // Not fatal: vector search may under-report until the
                // next successful sync.
                tracing::warn!(error = %err, "vector side-index sync failed at open");
                store.vec_index().mark_dirty();
            }
        }

        let mut searcher = search::HybridSearcher::new(store.clone())
            .with_config(config.search.clone());
        if let Some(embedder) = &ports.embedder {
            searcher = searcher.with_embedder(embedder.clone());
        }
        if let Some(reranker) = &ports.reranker {
            searcher = searcher.with_reranker(reranker.clone());
        }
        if let Some(generator) = &ports.generator {
            searcher = searcher.with_generator(generator.clone());
        }

        Ok(Self {
            graph: graph::GraphAccessor::new(store.clone()),
            pipeline: convert::default_pipeline(),
            detector: convert::default_detector(),
            config,
            store,
            ports,
            searcher,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One-shot conversion without touching the store.
    pub async fn convert(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        ext: &str,
        limits: convert::ConvertLimits,
    ) -> Result<convert::ConversionArtifact, EngineError> {
        let rel_path = if ext.is_empty() {
            "untitled".to_string()
        } else {
            format!("untitled.{ext}")
        };
        let input = convert::ConvertInput::new(rel_path, bytes, mime).with_limits(limits);
        Ok(self.pipeline.convert(input).await?)
    }

    /// Ingest one discovered file: the full write path.
    ///
    /// Unchanged bytes short-circuit. Failures are journaled in
    /// `ingest_errors` and recorded on the document row; they abort only
    /// this file, never a surrounding batch.
    pub async fn ingest(
        &self,
        collection: &str,
        rel_path: &str,
        bytes: Vec<u8>,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<DocumentRow, EngineError> {
        let source_hash = canonical::mirror_hash_bytes(&bytes);
        let existing = self.store.get_document(collection, rel_path)?;
        if let Some(existing) = &existing {
            // The last-error check keeps a stale mirror carried across a
            // failed re-ingest from masquerading as up to date.
            if existing.active
                && existing.source_hash == source_hash
                && existing.mirror_hash.is_some()
                && existing.last_error.is_none()
            {
                tracing::debug!(collection, rel_path, "source unchanged; skipping");
                return Ok(existing.clone());
            }
        }

        let size = bytes.len() as u64;
        let guess = {
            let ext = rel_path
                .rsplit('/')
                .next()
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, e)| e)
                .unwrap_or("");
            self.detector.detect(&bytes, ext)
        };

        let input = convert::ConvertInput::new(rel_path, bytes, guess.mime)
            .with_limits(self.config.convert_limits);
        let ext = input.ext.clone();

        // The document row exists before its content is materialized, so
        // conversion failures have a row to land on. The previous mirror
        // (and the metadata describing it) is carried until the new
        // conversion succeeds; nulling it here would detach the last good
        // content on a failed re-ingest and leave it for cleanup.
        let base = DocumentInput {
            collection: collection.to_string(),
            rel_path: rel_path.to_string(),
            source_hash: source_hash.clone(),
            source_mime: guess.mime.to_string(),
            source_ext: ext,
            source_size: size,
            source_mtime: mtime,
            mirror_hash: existing.as_ref().and_then(|d| d.mirror_hash.clone()),
            title: existing.as_ref().and_then(|d| d.title.clone()),
            converter_id: existing.as_ref().and_then(|d| d.converter_id.clone()),
            converter_version: existing.as_ref().and_then(|d| d.converter_version),
            language_hint: existing.as_ref().and_then(|d| d.language_hint.clone()),
        };
        self.store.upsert_document(base.clone())?;

        let artifact = match self.pipeline.convert(input).await {
            Ok(artifact) => artifact,
            Err(err) => {
                let details = serde_json::json!({
                    "converter_id": err.converter_id,
                    "mime": err.mime,
                    "ext": err.ext,
                    "retryable": err.retryable(),
                    "fatal": err.fatal,
                });
                self.store.record_ingest_error(
                    collection,
                    rel_path,
                    err.code(),
                    &err.message,
                    Some(details),
                )?;
                self.store
                    .set_document_error(collection, rel_path, err.code(), &err.message)?;
                return Err(err.into());
            }
        };

        self.store
            .upsert_content(&artifact.mirror_hash, &artifact.canonical_markdown)?;

        let chunks: Vec<store::ChunkRecord> =
            chunker::chunk_markdown(&artifact.canonical_markdown, &self.config.chunker)
                .into_iter()
                .map(Into::into)
                .collect();
        self.store.put_chunks(&artifact.mirror_hash, &chunks)?;

        let row = self.store.upsert_document(DocumentInput {
            mirror_hash: Some(artifact.mirror_hash.clone()),
            title: artifact.title.clone(),
            converter_id: Some(artifact.converter_id.clone()),
            converter_version: Some(artifact.converter_version),
            language_hint: artifact.language_hint.clone(),
            ..base
        })?;

        let parsed = links::extract_links(&artifact.canonical_markdown);
        self.store.put_links(&row.docid, &parsed)?;

        tracing::info!(
            collection,
            rel_path,
            docid = %row.docid,
            chunks = chunks.len(),
            links = parsed.len(),
            "ingested"
        );
        Ok(row)
    }

    /// Tombstone a document. Deep removal happens in
    /// [`Engine::cleanup_orphans`].
    pub fn remove(&self, collection: &str, rel_path: &str) -> Result<DocumentRow, EngineError> {
        Ok(self.store.set_document_active(collection, rel_path, false)?)
    }

    /// Produce vectors for every unembedded chunk of the active model.
    pub async fn embed_backlog(
        &self,
        batch_size: Option<usize>,
    ) -> Result<embed::BacklogReport, EngineError> {
        let embedder = self.ports.embedder.clone().ok_or_else(|| {
            EngineError::Validation("no embedder port configured".into())
        })?;
        let options = embed::BacklogOptions {
            batch_size: batch_size.unwrap_or_else(|| embed::BacklogOptions::default().batch_size),
        };
        let mut processor = embed::BacklogProcessor::new(self.store.clone(), embedder, options);
        Ok(processor.run(None).await?)
    }

    /// Lexical-only search.
    pub fn search_bm25(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<search::RankedResult>, EngineError> {
        Ok(self.searcher.search_bm25(query, &query_options(options, false, false))?)
    }

    /// Vector-only search.
    pub async fn search_vector(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<search::RankedResult>, EngineError> {
        Ok(self
            .searcher
            .search_vector(query, &query_options(options, false, false))
            .await?)
    }

    /// The full hybrid pipeline: expansion, BM25 ∥ vector retrieval, RRF
    /// fusion, cross-encoder reranking.
    pub async fn query(
        &self,
        query: &str,
        options: &HybridOptions,
    ) -> Result<Vec<search::RankedResult>, EngineError> {
        let opts = search::QueryOptions {
            collection: options.collection.clone(),
            limit: options.limit,
            expand: options.expand,
            rerank: options.rerank,
            threshold: None,
        };
        Ok(self.searcher.query(query, &opts).await?)
    }

    /// Outgoing links of a document, with an optional `wiki`/`markdown`
    /// type filter.
    pub fn get_links(
        &self,
        docid: &str,
        link_type: Option<&str>,
    ) -> Result<(DocumentRow, Vec<graph::OutgoingLink>), EngineError> {
        let filter = match link_type {
            Some(raw) => Some(links::LinkType::parse(raw).ok_or_else(|| {
                EngineError::Validation(format!(
                    "unknown link type '{raw}' (expected 'wiki' or 'markdown')"
                ))
            })?),
            None => None,
        };
        Ok(self.graph.get_links(docid, filter)?)
    }

    pub fn get_backlinks(
        &self,
        docid: &str,
    ) -> Result<(DocumentRow, Vec<store::Backlink>), EngineError> {
        Ok(self.graph.get_backlinks(docid)?)
    }

    pub fn get_similar(
        &self,
        docid: &str,
        options: &graph::SimilarOptions,
    ) -> Result<(DocumentRow, Vec<graph::SimilarDocument>), EngineError> {
        Ok(self.graph.get_similar(docid, options)?)
    }

    /// Remove everything unreachable (see the store's cleanup contract).
    pub fn cleanup_orphans(&self) -> Result<store::CleanupReport, EngineError> {
        Ok(self.store.cleanup_orphans()?)
    }

    pub fn get_ingest_errors(
        &self,
        collection: Option<&str>,
    ) -> Result<Vec<store::IngestErrorRow>, EngineError> {
        Ok(self.store.get_ingest_errors(collection)?)
    }
}

fn query_options(options: &SearchOptions, expand: bool, rerank: bool) -> search::QueryOptions {
    search::QueryOptions {
        collection: options.collection.clone(),
        limit: if options.limit == 0 { 10 } else { options.limit },
        expand,
        rerank,
        threshold: options.threshold,
    }
}

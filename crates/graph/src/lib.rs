//! GNO Graph - Link and Similarity Access over the Store
//!
//! Three read-side views of the document graph:
//!
//! - **Outgoing links** of a document, in source order, optionally
//!   filtered by link type, each with advisory resolution against the
//!   stored documents.
//! - **Backlinks**: documents whose links resolve to this one, sorted by
//!   `(source_uri, start_line, start_col)`.
//! - **Similar documents**: nearest neighbors of the mean of the
//!   document's stored chunk embeddings.

use std::collections::HashSet;
use std::sync::Arc;

use links::{ExtractedLink, LinkType};
use serde::{Deserialize, Serialize};
use store::{l2_normalize, Backlink, DocumentRow, NearestFilters, Store, StoreError};
use thiserror::Error;

/// Similarity lookup defaults.
const DEFAULT_SIMILAR_THRESHOLD: f32 = 0.5;
const MAX_AMPLIFIED_K: usize = 200;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Store(e) => e.code(),
            GraphError::Validation(_) => "VALIDATION",
        }
    }
}

/// An outgoing link plus advisory resolution.
#[derive(Debug, Clone)]
pub struct OutgoingLink {
    pub link: ExtractedLink,
    /// Whether a stored document currently matches the normalized
    /// target. Advisory: recomputed per call, never stored.
    pub resolved: bool,
}

/// Options for [`GraphAccessor::get_similar`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarOptions {
    pub limit: usize,
    pub threshold: f32,
    /// Search beyond the document's own collection.
    pub cross_collection: bool,
}

impl Default for SimilarOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: DEFAULT_SIMILAR_THRESHOLD,
            cross_collection: false,
        }
    }
}

/// One similar-document hit.
#[derive(Debug, Clone)]
pub struct SimilarDocument {
    pub doc: DocumentRow,
    /// Cosine similarity in `[0, 1]`, descending.
    pub score: f64,
}

/// Read-side accessor over links and embeddings.
pub struct GraphAccessor {
    store: Arc<Store>,
}

impl GraphAccessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Outgoing links of a document, sorted by `(start_line, start_col)`,
    /// optionally filtered by type.
    pub fn get_links(
        &self,
        docid: &str,
        link_type: Option<LinkType>,
    ) -> Result<(DocumentRow, Vec<OutgoingLink>), GraphError> {
        let doc = self.store.get_document_by_docid(docid)?;
        let mut stored = self.store.get_links_for_doc(&doc.docid)?;
        if let Some(wanted) = link_type {
            stored.retain(|link| link.link_type == wanted);
        }
        stored.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| a.start_col.cmp(&b.start_col))
        });

        let mut out = Vec::with_capacity(stored.len());
        for link in stored {
            let scope = link.target_collection.as_deref();
            let resolved = self
                .store
                .resolve_target(&link.target_ref_norm, scope)?
                .is_some();
            out.push(OutgoingLink { link, resolved });
        }
        Ok((doc, out))
    }

    /// Backlinks of a document, sorted by `(source_uri, start_line,
    /// start_col)`.
    pub fn get_backlinks(&self, docid: &str) -> Result<(DocumentRow, Vec<Backlink>), GraphError> {
        let doc = self.store.get_document_by_docid(docid)?;
        let backlinks = self.store.get_backlinks_for_doc(&doc)?;
        Ok((doc, backlinks))
    }

    /// Documents similar to this one, by the mean of its stored chunk
    /// embeddings.
    ///
    /// Requires the vector side-index; a document with no stored
    /// embeddings yields an empty list. The candidate pool is amplified
    /// to `min(20·limit, 200)` before collection filtering, self
    /// exclusion, and per-docid dedup; hits below the threshold are
    /// dropped and the top `limit` come back sorted by score descending.
    pub fn get_similar(
        &self,
        docid: &str,
        options: &SimilarOptions,
    ) -> Result<(DocumentRow, Vec<SimilarDocument>), GraphError> {
        if options.limit == 0 {
            return Err(GraphError::Validation("limit must be positive".into()));
        }
        if !self.store.vec_index().search_available() {
            return Err(GraphError::Store(StoreError::VecUnavailable));
        }
        let doc = self.store.get_document_by_docid(docid)?;
        let Some(mirror) = doc.mirror_hash.clone() else {
            return Ok((doc, Vec::new()));
        };

        let model = self.store.vec_index().model().to_string();
        let stored = self.store.get_vectors_for_mirror(&mirror, &model)?;
        if stored.is_empty() {
            tracing::debug!(docid = %doc.docid, "no stored embeddings; similarity is empty");
            return Ok((doc, Vec::new()));
        }

        // Mean of the chunk embeddings, renormalized for cosine search.
        let dims = self.store.vec_index().dimensions();
        let mut centroid = vec![0.0f32; dims];
        for (_, vector) in &stored {
            for (acc, v) in centroid.iter_mut().zip(vector.iter()) {
                *acc += v;
            }
        }
        let count = stored.len() as f32;
        for v in centroid.iter_mut() {
            *v /= count;
        }
        l2_normalize(&mut centroid);

        let amplified_k = (20 * options.limit).min(MAX_AMPLIFIED_K);
        let filters = NearestFilters {
            collection: (!options.cross_collection).then(|| doc.collection.clone()),
        };
        let hits = self.store.search_nearest(&centroid, amplified_k, &filters)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut similar: Vec<SimilarDocument> = Vec::new();
        for hit in hits {
            // All chunks of this document share its mirror; skipping the
            // mirror excludes self even when content is deduplicated.
            if hit.mirror_hash == mirror {
                continue;
            }
            let Some(candidate) = self
                .store
                .document_for_mirror(&hit.mirror_hash, filters.collection.as_deref())?
            else {
                continue;
            };
            if candidate.docid == doc.docid || !seen.insert(candidate.docid.clone()) {
                continue;
            }
            let score = f64::from((1.0 - hit.distance).clamp(0.0, 1.0));
            if score < options.threshold as f64 {
                continue;
            }
            similar.push(SimilarDocument {
                doc: candidate,
                score,
            });
        }

        similar.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc.docid.cmp(&b.doc.docid))
        });
        similar.truncate(options.limit);
        Ok((doc, similar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{
        ChunkRecord, DocumentInput, FtsTokenizer, StoreOptions, VecIndexOptions, VectorInput,
    };

    const DIMS: usize = 4;

    fn temp_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(
            dir.path().join("gno.redb"),
            StoreOptions::new(FtsTokenizer::Unicode61, VecIndexOptions::new("m", DIMS)),
        )
        .unwrap();
        (dir, Arc::new(store))
    }

    fn seed(
        store: &Store,
        collection: &str,
        rel_path: &str,
        title: &str,
        body: &str,
    ) -> (String, DocumentRow) {
        let markdown = canonical::canonicalize(body);
        let mirror = canonical::mirror_hash(&markdown);
        store.upsert_content(&mirror, &markdown).unwrap();
        store
            .put_chunks(
                &mirror,
                &[ChunkRecord {
                    seq: 0,
                    pos: 0,
                    text: markdown.clone(),
                    start_line: 1,
                    end_line: 1,
                    language: None,
                    token_count: None,
                }],
            )
            .unwrap();
        let doc = store
            .upsert_document(DocumentInput {
                collection: collection.into(),
                rel_path: rel_path.into(),
                source_hash: canonical::mirror_hash_bytes(body.as_bytes()),
                source_mime: "text/markdown".into(),
                source_ext: "md".into(),
                source_size: body.len() as u64,
                source_mtime: None,
                mirror_hash: Some(mirror.clone()),
                title: Some(title.into()),
                converter_id: None,
                converter_version: None,
                language_hint: None,
            })
            .unwrap();
        (mirror, doc)
    }

    fn put_vector(store: &Store, mirror: &str, vector: Vec<f32>) {
        store
            .upsert_vectors(&[VectorInput {
                mirror_hash: mirror.to_string(),
                seq: 0,
                vector,
            }])
            .unwrap();
    }

    #[test]
    fn outgoing_links_sorted_filtered_and_resolved() {
        let (_dir, store) = temp_store();
        let (_, doc) = seed(&store, "notes", "src.md", "Source", "text body");
        seed(&store, "notes", "target.md", "Known Page", "other body");

        let parsed =
            links::extract_links("a [md](x.md) then [[Known Page]]\n[[Missing Page]] last\n");
        store.put_links(&doc.docid, &parsed).unwrap();

        let accessor = GraphAccessor::new(store);
        let (_, all) = accessor.get_links(&doc.docid, None).unwrap();
        assert_eq!(all.len(), 3);
        // Source order: line 1 col 3 (markdown), line 1 wiki, line 2.
        assert!(all[0].link.start_line <= all[1].link.start_line);
        let known = all
            .iter()
            .find(|l| l.link.target_ref == "Known Page")
            .unwrap();
        assert!(known.resolved);
        let missing = all
            .iter()
            .find(|l| l.link.target_ref == "Missing Page")
            .unwrap();
        assert!(!missing.resolved);

        let (_, wiki_only) = accessor
            .get_links(&doc.docid, Some(LinkType::Wiki))
            .unwrap();
        assert_eq!(wiki_only.len(), 2);
    }

    #[test]
    fn backlinks_come_back_sorted() {
        let (_dir, store) = temp_store();
        let (_, target) = seed(&store, "notes", "hub.md", "Hub", "hub body");
        let (_, a) = seed(&store, "notes", "a.md", "A", "a body");
        let (_, b) = seed(&store, "notes", "b.md", "B", "b body");

        store
            .put_links(&b.docid, &links::extract_links("[[Hub]]\n"))
            .unwrap();
        store
            .put_links(&a.docid, &links::extract_links("[[Hub]]\n"))
            .unwrap();

        let accessor = GraphAccessor::new(store);
        let (_, backlinks) = accessor.get_backlinks(&target.docid).unwrap();
        assert_eq!(backlinks.len(), 2);
        assert!(backlinks[0].source_uri < backlinks[1].source_uri);
    }

    #[test]
    fn unknown_docid_is_not_found() {
        let (_dir, store) = temp_store();
        let accessor = GraphAccessor::new(store);
        let err = accessor.get_links("#abcdef", None).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn similar_excludes_self_and_honors_threshold() {
        let (_dir, store) = temp_store();
        let (m_query, query_doc) = seed(&store, "notes", "q.md", "Q", "query body");
        let (m_close, _) = seed(&store, "notes", "close.md", "C", "close body");
        let (m_far, _) = seed(&store, "notes", "far.md", "F", "far body");

        put_vector(&store, &m_query, vec![1.0, 0.0, 0.0, 0.0]);
        put_vector(&store, &m_close, vec![0.95, 0.05, 0.0, 0.0]);
        put_vector(&store, &m_far, vec![0.0, 1.0, 0.0, 0.0]);

        let accessor = GraphAccessor::new(store);
        let (_, similar) = accessor
            .get_similar(&query_doc.docid, &SimilarOptions::default())
            .unwrap();

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].doc.rel_path, "close.md");
        assert!(similar[0].score > 0.9);
        assert!(similar.iter().all(|s| s.doc.docid != query_doc.docid));
    }

    #[test]
    fn similar_scopes_by_collection_unless_cross() {
        let (_dir, store) = temp_store();
        let (m_query, query_doc) = seed(&store, "notes", "q.md", "Q", "query body");
        let (m_other, _) = seed(&store, "other", "o.md", "O", "other body");

        put_vector(&store, &m_query, vec![1.0, 0.0, 0.0, 0.0]);
        put_vector(&store, &m_other, vec![0.99, 0.01, 0.0, 0.0]);

        let accessor = GraphAccessor::new(store);
        let (_, scoped) = accessor
            .get_similar(&query_doc.docid, &SimilarOptions::default())
            .unwrap();
        assert!(scoped.is_empty());

        let (_, cross) = accessor
            .get_similar(
                &query_doc.docid,
                &SimilarOptions {
                    cross_collection: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].doc.collection, "other");
    }

    #[test]
    fn similar_without_embeddings_is_empty() {
        let (_dir, store) = temp_store();
        let (_, doc) = seed(&store, "notes", "bare.md", "Bare", "bare body");
        let accessor = GraphAccessor::new(store);
        let (_, similar) = accessor
            .get_similar(&doc.docid, &SimilarOptions::default())
            .unwrap();
        assert!(similar.is_empty());
    }

    #[test]
    fn similar_requires_vector_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            Store::open(
                dir.path().join("gno.redb"),
                StoreOptions::new(
                    FtsTokenizer::Unicode61,
                    VecIndexOptions::disabled("m", DIMS),
                ),
            )
            .unwrap(),
        );
        let (_, doc) = seed(&store, "notes", "a.md", "A", "body");

        let accessor = GraphAccessor::new(store);
        let err = accessor
            .get_similar(&doc.docid, &SimilarOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "VEC_UNAVAILABLE");
    }
}

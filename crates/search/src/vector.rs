//! Vector retrieval over the store's ANN side-index.

use std::collections::HashMap;

use embed::Embedder;
use store::{l2_normalize, NearestFilters, Store};

use crate::error::SearchError;
use crate::types::SearchCandidate;

/// Embed each vector variant (plus the HyDE passage when present),
/// unit-normalize, and run k-NN for each. Similarity is `1 - distance`
/// clamped into `[0, 1]`.
///
/// Returns one ranked candidate list per executed query.
pub async fn search_vector_lists(
    store: &Store,
    embedder: &dyn Embedder,
    variants: &[String],
    hyde_passage: &str,
    collection: Option<&str>,
    k: usize,
    threshold: Option<f32>,
) -> Result<Vec<Vec<SearchCandidate>>, SearchError> {
    let mut queries: Vec<&str> = variants.iter().map(|s| s.as_str()).collect();
    if !hyde_passage.trim().is_empty() {
        queries.push(hyde_passage);
    }

    let filters = NearestFilters {
        collection: collection.map(|c| c.to_string()),
    };

    // Embed + search first, then hydrate every list through one batched
    // chunk fetch.
    let mut raw_lists = Vec::with_capacity(queries.len());
    for query in &queries {
        let mut vector = embedder.embed(query).await?;
        l2_normalize(&mut vector);
        let hits = store.search_nearest(&vector, k, &filters)?;
        raw_lists.push(hits);
    }

    let hashes: Vec<String> = raw_lists
        .iter()
        .flatten()
        .map(|hit| hit.mirror_hash.clone())
        .collect();
    let lookup = store.get_chunks_batch(&hashes)?;

    let mut doc_cache: HashMap<String, Option<store::DocumentRow>> = HashMap::new();
    let mut lists = Vec::with_capacity(raw_lists.len());
    for hits in raw_lists {
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let similarity = (1.0 - hit.distance).clamp(0.0, 1.0);
            if let Some(threshold) = threshold {
                if similarity < threshold {
                    continue;
                }
            }
            let Some(chunk) = lookup.get(&hit.mirror_hash, hit.seq) else {
                continue;
            };
            let doc = match doc_cache.get(&hit.mirror_hash) {
                Some(cached) => cached.clone(),
                None => {
                    let found = store.document_for_mirror(&hit.mirror_hash, collection)?;
                    doc_cache.insert(hit.mirror_hash.clone(), found.clone());
                    found
                }
            };
            let Some(doc) = doc else { continue };
            candidates.push(SearchCandidate {
                mirror_hash: hit.mirror_hash,
                seq: hit.seq,
                docid: doc.docid,
                uri: doc.uri,
                title: doc.title,
                collection: doc.collection,
                rel_path: doc.rel_path,
                text: chunk.text.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                score: similarity as f64,
            });
        }
        lists.push(candidates);
    }
    Ok(lists)
}

//! BM25 retrieval over the store's full-text index.

use store::{FtsHit, FtsSearchOptions, Store};

use crate::error::SearchError;
use crate::types::SearchCandidate;

const SNIPPET_MAX_CHARS: usize = 240;

/// Map the store's negated-BM25 score into `[0, 1]`.
///
/// `1 - 1/(1 + e^{-raw})`: monotone decreasing in `raw`, so more-negative
/// (better) store scores map closer to 1. This mapping is part of the
/// schema-v1 scoring contract and must not change without a version bump.
pub fn normalize_bm25_score(raw: f64) -> f64 {
    1.0 - 1.0 / (1.0 + (-raw).exp())
}

/// Run one BM25 search per lexical variant and hydrate all hits through a
/// single batched chunk fetch.
///
/// Returns one ranked candidate list per variant, preserving the store's
/// ordering within each list.
pub fn search_lexical_lists(
    store: &Store,
    variants: &[String],
    collection: Option<&str>,
    per_variant_limit: usize,
) -> Result<Vec<Vec<SearchCandidate>>, SearchError> {
    let mut variant_hits: Vec<Vec<FtsHit>> = Vec::with_capacity(variants.len());
    for variant in variants {
        let hits = store.search_fts(
            variant,
            &FtsSearchOptions {
                collection: collection.map(|c| c.to_string()),
                limit: per_variant_limit,
            },
        )?;
        variant_hits.push(hits);
    }

    // One batched fetch for every hash across all variants; per-hash
    // chunk fetches here are an N+1 regression.
    let hashes: Vec<String> = variant_hits
        .iter()
        .flatten()
        .map(|hit| hit.mirror_hash.clone())
        .collect();
    let lookup = store.get_chunks_batch(&hashes)?;

    let mut lists = Vec::with_capacity(variant_hits.len());
    for hits in variant_hits {
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(chunk) = lookup.get(&hit.mirror_hash, hit.seq) else {
                continue;
            };
            candidates.push(SearchCandidate {
                mirror_hash: hit.mirror_hash,
                seq: hit.seq,
                docid: hit.docid,
                uri: hit.uri,
                title: hit.title,
                collection: hit.collection,
                rel_path: hit.rel_path,
                text: chunk.text.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                score: normalize_bm25_score(hit.score),
            });
        }
        lists.push(candidates);
    }
    Ok(lists)
}

/// A display snippet: the window around the first matching term, or the
/// head of the chunk when nothing matches.
pub fn build_snippet(text: &str, terms: &[String], max_chars: usize) -> String {
    let max_chars = if max_chars == 0 { SNIPPET_MAX_CHARS } else { max_chars };
    let haystack = text.to_lowercase();

    let mut window_start = 0usize;
    for term in terms {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if let Some(byte_pos) = haystack.find(&needle) {
            let char_pos = haystack[..byte_pos].chars().count();
            window_start = char_pos.saturating_sub(max_chars / 4);
            break;
        }
    }

    let chars: Vec<char> = text.chars().collect();
    let window_start = window_start.min(chars.len());
    let window_end = (window_start + max_chars).min(chars.len());
    let mut snippet: String = chars[window_start..window_end].iter().collect();
    snippet = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if window_start > 0 {
        snippet = format!("…{snippet}");
    }
    if window_end < chars.len() {
        snippet.push('…');
    }
    snippet
}

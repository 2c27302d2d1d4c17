//! Reciprocal Rank Fusion and rerank blending.

use std::collections::HashMap;

use crate::types::SearchCandidate;

/// The RRF constant: `rrf(d) = Σ 1 / (k + rank_i(d))`.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// One fused candidate with its RRF score and tie-break metadata.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub candidate: SearchCandidate,
    pub rrf_score: f64,
    /// Best (lowest) 1-based rank the candidate achieved in any list.
    pub best_rank: usize,
}

/// Merge ranked candidate lists with Reciprocal Rank Fusion.
///
/// `rank_i(d)` is the 1-based rank of the chunk within list `i`; a list
/// that does not contain the chunk contributes nothing. Output is sorted
/// by RRF descending, ties broken by the earlier (lower) best rank, then
/// by docid ascending. Fusion sums are independent of list order, so the
/// result is permutation-invariant across lists.
pub fn fuse_rrf(lists: &[Vec<SearchCandidate>], k: f64) -> Vec<FusedCandidate> {
    let mut fused: HashMap<(String, u32), FusedCandidate> = HashMap::new();

    for list in lists {
        for (index, candidate) in list.iter().enumerate() {
            let rank = index + 1;
            let contribution = 1.0 / (k + rank as f64);
            fused
                .entry(candidate.key())
                .and_modify(|entry| {
                    entry.rrf_score += contribution;
                    entry.best_rank = entry.best_rank.min(rank);
                })
                .or_insert_with(|| FusedCandidate {
                    candidate: candidate.clone(),
                    rrf_score: contribution,
                    best_rank: rank,
                });
        }
    }

    let mut out: Vec<FusedCandidate> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.candidate.docid.cmp(&b.candidate.docid))
            .then_with(|| a.candidate.key().cmp(&b.candidate.key()))
    });
    out
}

/// Min-max scale RRF scores across the candidate set into `[0, 1]`.
///
/// A degenerate set (all scores equal, including a single candidate)
/// normalizes to 1.0 for every member.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let Some(min) = scores.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().reduce(f64::max).unwrap_or(min);
    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

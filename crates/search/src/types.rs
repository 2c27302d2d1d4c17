//! Candidate and result types shared across the pipeline stages.

use serde::{Deserialize, Serialize};

/// One chunk-level retrieval candidate with its document identity.
///
/// `score` is the retriever's normalized score in `[0, 1]`; fusion works
/// on ranks, so the score only matters for single-retriever surfaces.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub mirror_hash: String,
    pub seq: u32,
    pub docid: String,
    pub uri: String,
    pub title: Option<String>,
    pub collection: String,
    pub rel_path: String,
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub score: f64,
}

impl SearchCandidate {
    /// Fusion identity: candidates are merged per chunk.
    pub fn key(&self) -> (String, u32) {
        (self.mirror_hash.clone(), self.seq)
    }
}

/// Line range of a snippet, 1-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetRange {
    pub start_line: u32,
    pub end_line: u32,
}

/// Source-file facts attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub rel_path: String,
    pub mime: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// The externally visible ranked result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    /// `#` followed by the document's hex identifier.
    pub docid: String,
    /// Always in `[0, 1]`.
    pub score: f64,
    pub uri: String,
    pub snippet: String,
    pub source: SourceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_range: Option<SnippetRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_key_is_chunk_identity()  {
        let candidate = SearchCandidate {
            mirror_hash: "h".into(),
            seq: 3,
            docid: "abcd1234".into(),
            uri: "gno://notes/a.md".into(),
            title: None,
            collection: "notes".into(),
            rel_path: "a.md".into(),
            text: "t".into(),
            start_line: 1,
            end_line: 2,
            score: 0.5,
        };
        assert_eq!(candidate.key(), ("h".to_string(), 3));
    }
}

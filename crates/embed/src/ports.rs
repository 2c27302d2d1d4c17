//! Async ports to the model runtime.

use async_trait::async_trait;

use crate::error::EmbedError;

/// Text embedding port.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `builtin:minilm` or `http://host/v1/embed`.
    /// Vectors are keyed by this value in the store.
    fn model_uri(&self) -> &str;

    /// Output dimensionality. Every returned vector has exactly this
    /// length.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed many texts. Implementations must return exactly one vector
    /// per input, in order; the backlog processor treats any length
    /// mismatch as a whole-batch failure.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Cross-encoder reranking port.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each candidate against the query, in `[0, 1]`, one score per
    /// candidate, in order.
    async fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, EmbedError>;
}

/// Text generation port, used by query expansion.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, EmbedError>;
}

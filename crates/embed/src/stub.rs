//! Deterministic stub embedder.
//!
//! Hash-seeded pseudo-random unit vectors: the same text always produces
//! the same vector, different texts almost surely produce different ones.
//! There is no semantic signal here: it exists so the full write/read
//! path can run and be tested without a model runtime.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::EmbedError;
use crate::ports::Embedder;

/// See the module docs. The default model URI is `stub:sha256`.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    model_uri: String,
    dimensions: usize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model_uri: "stub:sha256".to_string(),
            dimensions,
        }
    }

    pub fn with_model_uri(mut self, model_uri: impl Into<String>) -> Self {
        self.model_uri = model_uri.into();
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut state = u64::from_le_bytes(digest[0..8].try_into().unwrap_or([1; 8])).max(1);

        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            // xorshift64*; cheap, deterministic, platform-independent.
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let sample = state.wrapping_mul(0x2545_F491_4F6C_DD1D);
            vector.push(((sample >> 40) as f32 / 8_388_608.0) - 1.0);
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_uri(&self) -> &str {
        &self.model_uri
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

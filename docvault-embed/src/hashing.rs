//! Deterministic hashed bag-of-words embeddings.
//!
//! [`HashEmbedProvider`] maps tokens into a fixed number of signed buckets
//! with FNV hashing and L2-normalizes the result. It captures lexical
//! overlap only, not semantics, but it is fully deterministic, needs no
//! model files, and produces unit vectors with the same shape as the real
//! provider, which makes it the embedding backend for tests and for
//! offline environments where downloading an ONNX model is not an option.

use crate::error::{EmbedError, Result};
use crate::provider::{l2_normalize, preprocess, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Embedding provider backed by token hashing instead of a model.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
    max_chars: usize,
}

impl HashEmbedProvider {
    /// Create a provider emitting vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_chars: 2048,
        }
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let processed = preprocess(text, self.max_chars);
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in processed
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            let mut hasher = FnvHasher::default();
            hasher.write(lowered.as_bytes());
            let hash = hasher.finish();

            let bucket = ((hash >> 1) % self.dimension as u64) as usize;
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(EmbedError::EmptyInput);
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl Default for HashEmbedProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        // Pure CPU and cheap; no need for the blocking pool.
        self.embed_one(text)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text)?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let provider = HashEmbedProvider::new(64);
        let a = provider.embed_text("vector search engine").await.unwrap();
        let b = provider.embed_text("vector search engine").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_identical_text_has_max_similarity() {
        let provider = HashEmbedProvider::new(64);
        let a = provider.embed_text("semantic document retrieval").await.unwrap();
        let b = provider.embed_text("semantic document retrieval").await.unwrap();
        assert!((dot(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_tokens_beat_disjoint_tokens() {
        let provider = HashEmbedProvider::new(256);
        let query = provider.embed_text("climate report").await.unwrap();
        let related = provider.embed_text("climate change report").await.unwrap();
        let unrelated = provider.embed_text("financial markets overview").await.unwrap();

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_is_an_explicit_error() {
        let provider = HashEmbedProvider::default();
        assert!(matches!(
            provider.embed_text("   ").await,
            Err(EmbedError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let provider = HashEmbedProvider::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let batch = provider.embed_texts(&texts).await.unwrap();
        let single = provider.embed_text("alpha beta").await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, 32);
        assert_eq!(batch.embeddings[0], single);
    }
}

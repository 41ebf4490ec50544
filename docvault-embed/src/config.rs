//! Configuration for embedding models

use serde::{Deserialize, Serialize};

/// Configuration for embedding generation.
///
/// The defaults match the model the retrieval engine was tuned against:
/// `all-MiniLM-L6-v2` (384 dimensions) with a 512-token sequence budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings (required for cosine-via-inner-product)
    pub normalize: bool,
    /// Token budget of the model; texts are truncated to roughly 4 chars/token
    pub max_seq_length: usize,
    /// Maximum concurrent inference jobs on the blocking pool
    pub max_concurrency: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
            normalize: true,
            max_seq_length: 512,
            max_concurrency: 2,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for a named model with default settings.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the model token budget (builder style)
    pub fn with_max_seq_length(self, max_seq_length: usize) -> Self {
        Self {
            max_seq_length,
            ..self
        }
    }

    /// Set the number of concurrent inference jobs (builder style)
    pub fn with_max_concurrency(self, max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            ..self
        }
    }

    /// Character budget derived from the token budget (≈4 chars per token).
    pub fn max_chars(&self) -> usize {
        self.max_seq_length * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EmbedConfig::default();
        assert_eq!(config.model_name, "all-MiniLM-L6-v2");
        assert_eq!(config.batch_size, 32);
        assert!(config.normalize);
        assert_eq!(config.max_chars(), 2048);
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_config_builder_methods() {
        let config = EmbedConfig::new("custom-model")
            .with_batch_size(64)
            .with_normalize(false)
            .with_max_seq_length(256)
            .with_max_concurrency(0);

        assert_eq!(config.model_name, "custom-model");
        assert_eq!(config.batch_size, 64);
        assert!(!config.normalize);
        assert_eq!(config.max_chars(), 1024);
        assert_eq!(config.max_concurrency, 1, "concurrency is clamped to at least one");
    }
}

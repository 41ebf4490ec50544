//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::Semaphore;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result; the dimension is inferred from the
    /// first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations must fail with an explicit error rather than returning a
/// zero or placeholder vector: callers rank by similarity and a silent
/// default would corrupt the ranking without any visible signal.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Normalize whitespace and truncate to the model's character budget.
///
/// Every caller that embeds text goes through this, so document-level and
/// chunk-level vectors are produced from identically prepared input. The
/// truncation heuristic is character-based (≈4 chars per token) and lands on
/// a char boundary.
pub fn preprocess(text: &str, max_chars: usize) -> String {
    let mut collapsed = String::with_capacity(text.len().min(max_chars));
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
        if collapsed.len() > max_chars {
            break;
        }
    }
    if collapsed.len() > max_chars {
        let mut cut = max_chars;
        while cut > 0 && !collapsed.is_char_boundary(cut) {
            cut -= 1;
        }
        collapsed.truncate(cut);
    }
    collapsed
}

/// Scale a vector to unit L2 norm; zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// FastEmbed-based embedding provider using local ONNX models.
///
/// Inference is CPU-bound and synchronous inside the model; it always runs
/// on `spawn_blocking`, and a small semaphore bounds how many inference jobs
/// can be in flight at once. Batch loops await between batches, so dropping
/// the returned future cancels the remaining work cooperatively.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider; call [`initialize`](Self::initialize)
    /// (or use [`create`](Self::create)) before embedding.
    pub fn new(config: EmbedConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            config,
            model: None,
            dimension: 384, // all-MiniLM-L6-v2
            permits,
        }
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Loads the embedding model, reusing the global cache when possible.
    pub async fn initialize(&mut self) -> Result<()> {
        tracing::info!("Initializing FastEmbed provider for model: {}", self.config.model_name);

        let cache_key = self.create_cache_key();

        let cached = {
            let cache = get_model_cache().lock().unwrap();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };
        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", self.config.model_name);
            self.model = Some(model);
            self.dimension = dimension;
            return Ok(());
        }

        let builtin = builtin_model(&self.config.model_name)?;
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(builtin).with_show_download_progress(false);
                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(EmbedError::model_unavailable)?;

                // Probe the dimension with a throwaway embedding.
                let probe = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(EmbedError::model_unavailable)?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(384);

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model_arc = Arc::new(Mutex::new(model));
        {
            let mut cache = get_model_cache().lock().unwrap();
            cache.insert(cache_key, (Arc::clone(&model_arc), dimension));
        }
        self.model = Some(model_arc);
        self.dimension = dimension;
        Ok(())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        get_model_cache().lock().unwrap().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        get_model_cache().lock().unwrap().len()
    }

    /// Deterministic cache key derived from the full configuration.
    fn create_cache_key(&self) -> String {
        let config_json =
            serde_json::to_string(&self.config).expect("Config should always serialize");

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }
}

/// Map a configured model name onto a built-in fastembed model.
fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbedError::invalid_config(format!(
            "unsupported embedding model '{other}'"
        ))),
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyInput)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        let mut prepared = Vec::with_capacity(texts.len());
        for text in texts {
            let processed = preprocess(text, self.config.max_chars());
            if processed.is_empty() {
                return Err(EmbedError::EmptyInput);
            }
            prepared.push(processed);
        }

        tracing::debug!("Generating embeddings for {} texts", prepared.len());

        let normalize = self.config.normalize;
        let mut all_embeddings = Vec::with_capacity(prepared.len());
        for batch in prepared.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model_clone = Arc::clone(model);

            // The permit bounds concurrent inference across all callers.
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| EmbedError::model_unavailable(anyhow::anyhow!(e)))?;

            let mut batch_embeddings =
                tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                    tracing::debug!("Processing batch of {} texts", batch.len());
                    let mut model_guard = model_clone.lock().unwrap();
                    model_guard
                        .embed(batch, None)
                        .map_err(EmbedError::model_unavailable)
                })
                .await??;

            if normalize {
                for embedding in &mut batch_embeddings {
                    l2_normalize(embedding);
                }
            }
            all_embeddings.extend(batch_embeddings);
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

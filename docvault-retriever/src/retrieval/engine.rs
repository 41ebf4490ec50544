//! The retrieval engine: orchestrates chunking, embedding, both vector
//! indices, persistence, and the soft-delete/rebuild lifecycle.
//!
//! ## Concurrency model
//!
//! Each index lives behind `RwLock<Arc<VectorIndex>>`. Readers clone the
//! `Arc` under a momentary read lock and scan a published immutable
//! snapshot, so searches never block on writers and never observe a
//! half-built index. Writers mutate through `Arc::make_mut` under the
//! write lock and publish atomically. Insert, remove, and rebuild are
//! mutually exclusive with each other: while a rebuild is in flight (an
//! atomic flag), other mutations fail with `RebuildInProgress` and the
//! caller retries.
//!
//! Embedding inference and artifact persistence are the only blocking
//! operations; both run on `spawn_blocking`. Index scans are CPU-bound and
//! run on the blocking pool behind a small semaphore so concurrent queries
//! cannot fan out without bound.

use chrono::Utc;
use docvault_chunk::{ChunkStrategy, Chunker, ChunkerConfig};
use docvault_embed::EmbeddingProvider;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{map_embed_error, Result, RetrieverError};
use crate::index::ann::IndexKind;
use crate::index::persistence::IndexPersistence;
use crate::index::{ChunkRecord, DocumentRecord, SlotRecord, VectorIndex};
use crate::retrieval::search::{
    aggregate_chunks, candidate_from_document, merge_hybrid, sort_candidates, DocCandidate,
    SearchHit, SearchRequest, SearchResponse,
};

/// Artifact names for the two logical indices.
const DOCUMENTS_INDEX: &str = "documents";
const CHUNKS_INDEX: &str = "chunks";

/// Configuration for the retrieval engine.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Directory holding the index artifacts.
    pub index_dir: PathBuf,
    /// Vector dimension; must match the embedding provider.
    pub dimension: usize,
    /// Nearest-neighbor structure for both indices.
    pub index_kind: IndexKind,
    /// Length limits used when chunking documents.
    pub chunker_config: ChunkerConfig,
    /// Weight of document-level scores in hybrid merging.
    pub document_weight: f32,
    /// Weight of chunk-level scores in hybrid merging.
    pub chunk_weight: f32,
    /// Document-level searches fetch `top_k` times this factor.
    pub document_oversample: usize,
    /// Chunk-level searches fetch `top_k` times this factor, since several
    /// chunks of one document may all match.
    pub chunk_oversample: usize,
    /// Character prefix of the document text used for the whole-document
    /// embedding.
    pub document_prefix_chars: usize,
    /// Concurrent index scans allowed on the blocking pool.
    pub search_concurrency: usize,
}

impl RetrievalConfig {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            dimension: 384,
            index_kind: IndexKind::Flat,
            chunker_config: ChunkerConfig::default(),
            document_weight: 0.3,
            chunk_weight: 0.7,
            document_oversample: 2,
            chunk_oversample: 3,
            document_prefix_chars: 2000,
            search_concurrency: 4,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_index_kind(mut self, index_kind: IndexKind) -> Self {
        self.index_kind = index_kind;
        self
    }

    pub fn with_chunker_config(mut self, chunker_config: ChunkerConfig) -> Self {
        self.chunker_config = chunker_config;
        self
    }

    pub fn with_weights(mut self, document_weight: f32, chunk_weight: f32) -> Self {
        self.document_weight = document_weight;
        self.chunk_weight = chunk_weight;
        self
    }

    pub fn with_chunk_oversample(mut self, chunk_oversample: usize) -> Self {
        self.chunk_oversample = chunk_oversample.max(1);
        self
    }
}

/// A request to chunk, embed, and index one document.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub document_id: String,
    pub text: String,
    pub strategy: ChunkStrategy,
    pub document_type: Option<String>,
    /// When the document is already indexed: `false` skips the request
    /// (idempotent), `true` soft-deletes the prior vectors first.
    pub force: bool,
}

impl IndexRequest {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            strategy: ChunkStrategy::Paragraph,
            document_type: None,
            force: false,
        }
    }

    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// What an indexing request produced.
#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    /// True when prior vectors for the document were soft-deleted first.
    pub reindexed: bool,
}

/// Tombstone counts from a document removal.
#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    pub document_vectors: usize,
    pub chunk_vectors: usize,
}

/// Before/after vector counts from a rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    pub old_document_vectors: usize,
    pub new_document_vectors: usize,
    pub old_chunk_vectors: usize,
    pub new_chunk_vectors: usize,
}

/// Snapshot of index sizes.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatsReport {
    pub document_vectors: usize,
    pub chunk_vectors: usize,
    pub active_document_vectors: usize,
    pub active_chunk_vectors: usize,
}

/// The semantic retrieval engine.
///
/// Construct with an explicit embedding provider; there is no global
/// instance; the host application owns the engine and injects its
/// dependencies.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    documents: RwLock<Arc<VectorIndex>>,
    chunks: RwLock<Arc<VectorIndex>>,
    persistence: Arc<IndexPersistence>,
    search_permits: Semaphore,
    rebuilding: AtomicBool,
}

impl RetrievalEngine {
    /// Create an engine, loading any persisted index artifacts.
    ///
    /// Fails when the provider's dimension disagrees with the configured
    /// index dimension; missing or unreadable artifacts just mean empty
    /// indices.
    pub async fn new(
        config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if embedder.embedding_dimension() != config.dimension {
            return Err(RetrieverError::DimensionMismatch {
                expected: config.dimension,
                actual: embedder.embedding_dimension(),
            });
        }

        let persistence = Arc::new(IndexPersistence::new(config.index_dir.clone()));
        let loader = Arc::clone(&persistence);
        let kind = config.index_kind;
        let dimension = config.dimension;
        let (documents, chunks) = tokio::task::spawn_blocking(move || {
            (
                loader.load(DOCUMENTS_INDEX, kind, dimension),
                loader.load(CHUNKS_INDEX, kind, dimension),
            )
        })
        .await?;

        info!(
            documents = documents.total_count(),
            chunks = chunks.total_count(),
            provider = embedder.provider_name(),
            "retrieval engine ready"
        );

        Ok(Self {
            search_permits: Semaphore::new(config.search_concurrency.max(1)),
            config,
            embedder,
            documents: RwLock::new(Arc::new(documents)),
            chunks: RwLock::new(Arc::new(chunks)),
            persistence,
            rebuilding: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn ensure_not_rebuilding(&self) -> Result<()> {
        if self.rebuilding.load(Ordering::SeqCst) {
            return Err(RetrieverError::RebuildInProgress);
        }
        Ok(())
    }

    fn documents_snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.documents.read().unwrap())
    }

    fn chunks_snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.chunks.read().unwrap())
    }

    /// Chunk, embed, and index one document into both indices.
    pub async fn embed_and_index(&self, request: IndexRequest) -> Result<IndexOutcome> {
        if request.document_id.trim().is_empty() {
            return Err(RetrieverError::invalid_request("document_id must not be empty"));
        }
        self.ensure_not_rebuilding()?;

        let already_indexed = self
            .documents_snapshot()
            .contains_active_document(&request.document_id);
        if already_indexed && !request.force {
            debug!(document_id = %request.document_id, "already indexed; skipping");
            return Ok(IndexOutcome {
                chunks_created: 0,
                embeddings_generated: 0,
                reindexed: false,
            });
        }

        let chunker = Chunker::new(request.strategy, self.config.chunker_config.clone());
        let chunks = chunker.chunk(&request.text);
        if chunks.is_empty() {
            return Err(RetrieverError::invalid_request(
                "document has no indexable text",
            ));
        }

        // Embed before touching either index, so a model failure leaves
        // the engine exactly as it was.
        let prefix = document_prefix(&request.text, self.config.document_prefix_chars);
        let document_vector = self
            .embedder
            .embed_text(prefix)
            .await
            .map_err(map_embed_error)?;
        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vectors = self
            .embedder
            .embed_texts(&chunk_texts)
            .await
            .map_err(map_embed_error)?;
        if chunk_vectors.len() != chunks.len() {
            return Err(RetrieverError::Other(anyhow::anyhow!(
                "provider returned {} embeddings for {} chunks",
                chunk_vectors.len(),
                chunks.len()
            )));
        }

        let created_at = Utc::now().timestamp();
        self.ensure_not_rebuilding()?;

        {
            let mut documents = self.documents.write().unwrap();
            let index = Arc::make_mut(&mut documents);
            if already_indexed {
                index.remove_document(&request.document_id);
            }
            index.insert(
                &document_vector,
                SlotRecord::Document(DocumentRecord {
                    document_id: request.document_id.clone(),
                    model_name: self.embedder.provider_name().to_string(),
                    dimension: self.config.dimension,
                    document_type: request.document_type.clone(),
                    created_at,
                    active: true,
                }),
            )?;
        }
        {
            let mut chunk_index = self.chunks.write().unwrap();
            let index = Arc::make_mut(&mut chunk_index);
            if already_indexed {
                index.remove_document(&request.document_id);
            }
            for (ordinal, (chunk, vector)) in
                chunks.iter().zip(chunk_vectors.embeddings.iter()).enumerate()
            {
                index.insert(
                    vector,
                    SlotRecord::Chunk(ChunkRecord {
                        chunk_id: format!("{}:{}", request.document_id, ordinal),
                        document_id: request.document_id.clone(),
                        ordinal: ordinal as u32,
                        span_start: chunk.start,
                        span_end: chunk.end,
                        chunk_type: chunk.kind.to_string(),
                        excerpt: chunk.text.clone(),
                        document_type: request.document_type.clone(),
                        created_at,
                        active: true,
                        usage_count: 0,
                    }),
                )?;
            }
        }

        self.persist().await?;

        info!(
            document_id = %request.document_id,
            chunks = chunks.len(),
            reindexed = already_indexed,
            "indexed document"
        );
        Ok(IndexOutcome {
            chunks_created: chunks.len(),
            embeddings_generated: chunks.len() + 1,
            reindexed: already_indexed,
        })
    }

    /// Run a query across the configured index levels.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        if request.query.trim().is_empty() {
            return Err(RetrieverError::invalid_request("query must not be empty"));
        }
        if request.top_k == 0 {
            return Err(RetrieverError::invalid_request("top_k must be at least 1"));
        }

        // Fail fast and explicitly when the query cannot be embedded; an
        // empty result here would mask a subsystem failure.
        let query_vector = self
            .embedder
            .embed_text(&request.query)
            .await
            .map_err(map_embed_error)?;

        let documents = self.documents_snapshot();
        let chunks = self.chunks_snapshot();
        let search_type = request.search_type;
        let min_score = request.min_score;
        let document_fetch = request.top_k.saturating_mul(self.config.document_oversample);
        let chunk_fetch = request.top_k.saturating_mul(self.config.chunk_oversample);
        let document_weight = self.config.document_weight;
        let chunk_weight = self.config.chunk_weight;

        let _permit = self
            .search_permits
            .acquire()
            .await
            .map_err(|e| RetrieverError::Other(anyhow::anyhow!(e)))?;
        let mut candidates =
            tokio::task::spawn_blocking(move || -> Result<Vec<DocCandidate>> {
                let document_candidates = if search_type.includes_documents() {
                    documents
                        .search(&query_vector, document_fetch, min_score)?
                        .iter()
                        .filter_map(candidate_from_document)
                        .collect()
                } else {
                    Vec::new()
                };
                let chunk_candidates = if search_type.includes_chunks() {
                    aggregate_chunks(&chunks.search(&query_vector, chunk_fetch, min_score)?)
                } else {
                    Vec::new()
                };

                Ok(match search_type {
                    crate::retrieval::SearchType::Document => document_candidates,
                    crate::retrieval::SearchType::Chunk => chunk_candidates,
                    crate::retrieval::SearchType::Hybrid => merge_hybrid(
                        document_candidates,
                        chunk_candidates,
                        document_weight,
                        chunk_weight,
                    ),
                })
            })
            .await??;
        drop(_permit);

        // Post-filters run after the nearest-neighbor pass.
        candidates
            .retain(|c| request.filters.matches(c.document_type.as_deref(), c.created_at));
        sort_candidates(&mut candidates);
        candidates.truncate(request.top_k);

        let used_chunks: Vec<(usize, String)> = candidates
            .iter()
            .flat_map(|c| c.chunk_hits.iter().cloned())
            .collect();
        if !used_chunks.is_empty() && !self.rebuilding.load(Ordering::SeqCst) {
            let mut chunk_index = self.chunks.write().unwrap();
            Arc::make_mut(&mut chunk_index).record_usage(&used_chunks);
        }

        let hits: Vec<SearchHit> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| SearchHit {
                document_id: candidate.document_id,
                score: candidate.score,
                rank: i + 1,
                chunk_excerpts: if request.include_chunks {
                    candidate.excerpts
                } else {
                    Vec::new()
                },
            })
            .collect();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            query = %request.query,
            hits = hits.len(),
            elapsed_ms,
            "search complete"
        );
        Ok(SearchResponse {
            total: hits.len(),
            hits,
            elapsed_ms,
            search_type,
        })
    }

    /// Soft-delete every vector belonging to `document_id` in both indices.
    pub async fn remove_document(&self, document_id: &str) -> Result<RemoveOutcome> {
        if document_id.trim().is_empty() {
            return Err(RetrieverError::invalid_request("document_id must not be empty"));
        }
        self.ensure_not_rebuilding()?;

        let document_vectors = {
            let mut documents = self.documents.write().unwrap();
            Arc::make_mut(&mut documents).remove_document(document_id)
        };
        let chunk_vectors = {
            let mut chunks = self.chunks.write().unwrap();
            Arc::make_mut(&mut chunks).remove_document(document_id)
        };

        self.persist().await?;

        info!(document_id, document_vectors, chunk_vectors, "tombstoned document");
        Ok(RemoveOutcome {
            document_vectors,
            chunk_vectors,
        })
    }

    /// Rebuild both indices from their active records, reclaiming
    /// tombstoned storage and reassigning slots. The replacement is built
    /// off-lock and swapped in atomically; concurrent mutations fail with
    /// [`RetrieverError::RebuildInProgress`] until the swap completes.
    pub async fn rebuild_index(&self) -> Result<RebuildOutcome> {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return Err(RetrieverError::RebuildInProgress);
        }
        let result = self.rebuild_inner().await;
        self.rebuilding.store(false, Ordering::SeqCst);
        result
    }

    async fn rebuild_inner(&self) -> Result<RebuildOutcome> {
        let documents_snapshot = self.documents_snapshot();
        let chunks_snapshot = self.chunks_snapshot();
        let old_document_vectors = documents_snapshot.total_count();
        let old_chunk_vectors = chunks_snapshot.total_count();

        let (new_documents, new_chunks) = tokio::task::spawn_blocking(move || {
            (documents_snapshot.rebuild(), chunks_snapshot.rebuild())
        })
        .await?;
        let new_document_vectors = new_documents.total_count();
        let new_chunk_vectors = new_chunks.total_count();

        *self.documents.write().unwrap() = Arc::new(new_documents);
        *self.chunks.write().unwrap() = Arc::new(new_chunks);

        self.persist().await?;

        info!(
            old_document_vectors,
            new_document_vectors,
            old_chunk_vectors,
            new_chunk_vectors,
            "rebuilt indices"
        );
        Ok(RebuildOutcome {
            old_document_vectors,
            new_document_vectors,
            old_chunk_vectors,
            new_chunk_vectors,
        })
    }

    /// Current vector counts, total and active, for both indices.
    pub fn get_index_stats(&self) -> IndexStatsReport {
        let documents = self.documents_snapshot();
        let chunks = self.chunks_snapshot();
        IndexStatsReport {
            document_vectors: documents.total_count(),
            chunk_vectors: chunks.total_count(),
            active_document_vectors: documents.active_count(),
            active_chunk_vectors: chunks.active_count(),
        }
    }

    /// Write both indices to their artifacts (temp-then-rename).
    pub async fn persist(&self) -> Result<()> {
        let documents = self.documents_snapshot();
        let chunks = self.chunks_snapshot();
        let persistence = Arc::clone(&self.persistence);
        tokio::task::spawn_blocking(move || -> Result<()> {
            persistence.save(DOCUMENTS_INDEX, &documents)?;
            persistence.save(CHUNKS_INDEX, &chunks)?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

/// First `max_chars` characters of the text, on a char boundary. The
/// whole-document vector embeds this prefix rather than the full text.
fn document_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SearchType;
    use docvault_embed::HashEmbedProvider;
    use tempfile::tempdir;

    const DIM: usize = 64;

    async fn engine(dir: &std::path::Path) -> RetrievalEngine {
        let config = RetrievalConfig::new(dir).with_dimension(DIM);
        let embedder = Arc::new(HashEmbedProvider::new(DIM));
        RetrievalEngine::new(config, embedder).await.unwrap()
    }

    fn long_text(topic: &str) -> String {
        format!(
            "This document is all about {topic} and related concerns.\n\n\
             The second paragraph continues to describe {topic} in much more detail, \
             adding enough words to clear the minimum chunk length comfortably.\n\n\
             A closing paragraph summarizes what was said about {topic} here."
        )
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_at_construction() {
        let dir = tempdir().unwrap();
        let config = RetrievalConfig::new(dir.path()).with_dimension(128);
        let embedder = Arc::new(HashEmbedProvider::new(64));
        let result = RetrievalEngine::new(config, embedder).await;
        assert!(matches!(
            result,
            Err(RetrieverError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
        ));
    }

    #[tokio::test]
    async fn indexing_is_idempotent_without_force() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        let first = engine
            .embed_and_index(IndexRequest::new("d1", long_text("storage engines")))
            .await
            .unwrap();
        assert!(first.chunks_created > 0);
        assert_eq!(first.embeddings_generated, first.chunks_created + 1);
        assert!(!first.reindexed);

        let stats_before = engine.get_index_stats();
        let second = engine
            .embed_and_index(IndexRequest::new("d1", long_text("storage engines")))
            .await
            .unwrap();
        assert_eq!(second.chunks_created, 0);
        assert!(!second.reindexed);

        let stats_after = engine.get_index_stats();
        assert_eq!(stats_before.document_vectors, stats_after.document_vectors);
        assert_eq!(stats_before.chunk_vectors, stats_after.chunk_vectors);
    }

    #[tokio::test]
    async fn force_reindex_tombstones_prior_vectors() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        engine
            .embed_and_index(IndexRequest::new("d1", long_text("databases")))
            .await
            .unwrap();
        let before = engine.get_index_stats();

        let outcome = engine
            .embed_and_index(IndexRequest::new("d1", long_text("databases")).with_force(true))
            .await
            .unwrap();
        assert!(outcome.reindexed);

        let after = engine.get_index_stats();
        // Totals grow (old vectors stay as tombstones), actives stay equal.
        assert!(after.document_vectors > before.document_vectors);
        assert!(after.chunk_vectors > before.chunk_vectors);
        assert_eq!(after.active_document_vectors, before.active_document_vectors);
        assert_eq!(after.active_chunk_vectors, before.active_chunk_vectors);
    }

    #[tokio::test]
    async fn search_returns_indexed_document() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        engine
            .embed_and_index(IndexRequest::new("ml", long_text("machine learning basics")))
            .await
            .unwrap();
        engine
            .embed_and_index(IndexRequest::new("fin", long_text("financial markets")))
            .await
            .unwrap();

        let response = engine
            .search(SearchRequest::new(
                "machine learning basics",
                SearchType::Hybrid,
            ))
            .await
            .unwrap();

        assert!(!response.hits.is_empty());
        assert_eq!(response.hits[0].document_id, "ml");
        assert_eq!(response.hits[0].rank, 1);
        assert_eq!(response.total, response.hits.len());
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_empty_success() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        let response = engine
            .search(SearchRequest::new("anything at all", SearchType::Hybrid))
            .await
            .unwrap();
        assert!(response.hits.is_empty());
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn empty_query_is_an_explicit_error() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let result = engine
            .search(SearchRequest::new("   ", SearchType::Document))
            .await;
        assert!(matches!(result, Err(RetrieverError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn removed_document_disappears_before_rebuild() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        engine
            .embed_and_index(IndexRequest::new("gone", long_text("vanishing documents")))
            .await
            .unwrap();
        engine
            .embed_and_index(IndexRequest::new("kept", long_text("surviving documents")))
            .await
            .unwrap();

        let before = engine.get_index_stats();
        let removed = engine.remove_document("gone").await.unwrap();
        assert_eq!(removed.document_vectors, 1);
        assert!(removed.chunk_vectors > 0);

        let after = engine.get_index_stats();
        assert_eq!(after.document_vectors, before.document_vectors, "total unchanged");
        assert!(after.active_document_vectors < before.active_document_vectors);

        let response = engine
            .search(
                SearchRequest::new("vanishing documents", SearchType::Hybrid).with_top_k(10),
            )
            .await
            .unwrap();
        assert!(response.hits.iter().all(|h| h.document_id != "gone"));
    }

    #[tokio::test]
    async fn rebuild_reclaims_tombstones_and_preserves_active() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        engine
            .embed_and_index(IndexRequest::new("a", long_text("alpha topics")))
            .await
            .unwrap();
        engine
            .embed_and_index(IndexRequest::new("b", long_text("beta topics")))
            .await
            .unwrap();
        engine.remove_document("a").await.unwrap();

        let before = engine.get_index_stats();
        let outcome = engine.rebuild_index().await.unwrap();
        assert_eq!(outcome.old_document_vectors, before.document_vectors);
        assert_eq!(outcome.new_document_vectors, before.active_document_vectors);
        assert_eq!(outcome.new_chunk_vectors, before.active_chunk_vectors);

        let after = engine.get_index_stats();
        assert_eq!(after.document_vectors, after.active_document_vectors);

        // The surviving document is still searchable.
        let response = engine
            .search(SearchRequest::new("beta topics", SearchType::Hybrid))
            .await
            .unwrap();
        assert_eq!(response.hits[0].document_id, "b");
    }

    #[tokio::test]
    async fn include_chunks_controls_excerpts() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine
            .embed_and_index(IndexRequest::new("d", long_text("excerpt handling")))
            .await
            .unwrap();

        let bare = engine
            .search(SearchRequest::new("excerpt handling", SearchType::Chunk))
            .await
            .unwrap();
        assert!(bare.hits[0].chunk_excerpts.is_empty());

        let detailed = engine
            .search(
                SearchRequest::new("excerpt handling", SearchType::Chunk)
                    .with_include_chunks(true),
            )
            .await
            .unwrap();
        assert!(!detailed.hits[0].chunk_excerpts.is_empty());
        let excerpt = &detailed.hits[0].chunk_excerpts[0];
        let source = long_text("excerpt handling");
        assert_eq!(excerpt.text, source[excerpt.span_start..excerpt.span_end]);
    }

    #[tokio::test]
    async fn chunk_search_bumps_usage_counts() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine
            .embed_and_index(IndexRequest::new("d", long_text("usage accounting")))
            .await
            .unwrap();

        engine
            .search(SearchRequest::new("usage accounting", SearchType::Chunk))
            .await
            .unwrap();

        let chunks = engine.chunks_snapshot();
        let used: u64 = chunks
            .records()
            .values()
            .filter_map(|r| r.as_chunk())
            .map(|c| c.usage_count)
            .sum();
        assert!(used > 0);
    }

    #[tokio::test]
    async fn type_filter_excludes_other_documents() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        engine
            .embed_and_index(
                IndexRequest::new("r", long_text("quarterly figures"))
                    .with_document_type("report"),
            )
            .await
            .unwrap();
        engine
            .embed_and_index(
                IndexRequest::new("i", long_text("quarterly figures"))
                    .with_document_type("invoice"),
            )
            .await
            .unwrap();

        let filters = crate::retrieval::SearchFilters {
            document_types: Some(vec!["report".to_string()]),
            ..Default::default()
        };
        let response = engine
            .search(
                SearchRequest::new("quarterly figures", SearchType::Hybrid)
                    .with_filters(filters),
            )
            .await
            .unwrap();

        assert!(!response.hits.is_empty());
        assert!(response.hits.iter().all(|h| h.document_id == "r"));
    }

    #[tokio::test]
    async fn state_survives_engine_restart() {
        let dir = tempdir().unwrap();
        {
            let engine = engine(dir.path()).await;
            engine
                .embed_and_index(IndexRequest::new("persisted", long_text("durable state")))
                .await
                .unwrap();
        }

        let reopened = engine(dir.path()).await;
        let stats = reopened.get_index_stats();
        assert_eq!(stats.document_vectors, 1);
        assert!(stats.chunk_vectors > 0);

        let response = reopened
            .search(SearchRequest::new("durable state", SearchType::Hybrid))
            .await
            .unwrap();
        assert_eq!(response.hits[0].document_id, "persisted");
    }

    #[test]
    fn document_prefix_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(document_prefix(&text, 4), "éééé");
        assert_eq!(document_prefix(&text, 100), text.as_str());
    }
}

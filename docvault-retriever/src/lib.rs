//! docvault-retriever: semantic document retrieval engine
//!
//! This crate maintains two vector indices (whole-document and chunk) and
//! answers natural-language queries against them. Documents are chunked
//! (docvault-chunk), embedded (docvault-embed), and inserted into
//! append-only nearest-neighbor structures with strict slot/metadata
//! consistency, a soft-delete + rebuild lifecycle, and crash-safe artifact
//! persistence.
//!
//! ## Key Modules
//!
//! - **[`index`]**: vector indices (exact and approximate), slot records,
//!   and atomic artifact persistence
//! - **[`retrieval`]**: the [`RetrievalEngine`](retrieval::RetrievalEngine),
//!   search types, and hybrid ranking
//! - **[`error`]**: the error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docvault_embed::HashEmbedProvider;
//! use docvault_retriever::retrieval::{
//!     IndexRequest, RetrievalConfig, RetrievalEngine, SearchRequest, SearchType,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrievalConfig::new("data/docvault").with_dimension(384);
//! let embedder = Arc::new(HashEmbedProvider::new(384));
//! let engine = RetrievalEngine::new(config, embedder).await?;
//!
//! engine
//!     .embed_and_index(IndexRequest::new("doc-1", "Document text to index."))
//!     .await?;
//! let results = engine
//!     .search(SearchRequest::new("document text", SearchType::Hybrid))
//!     .await?;
//! println!("{} hits", results.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Text → Chunker → EmbeddingProvider → VectorIndex (documents)
//!                                    → VectorIndex (chunks)
//!                                          ↓              ↑
//! Query → embed → search both → aggregate/merge → IndexPersistence
//! ```

pub mod error;
pub mod index;
pub mod retrieval;

pub use error::{Result, RetrieverError};

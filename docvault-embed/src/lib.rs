//! # docvault-embed
//!
//! Embedding generation for the docvault retrieval engine. Text goes in,
//! L2-normalized fixed-dimension `f32` vectors come out, and every failure
//! is an explicit error. No code path substitutes a zero vector, so the
//! ranking layer downstream can trust every vector it receives.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX inference via fastembed
//!   (`all-MiniLM-L6-v2` by default, 384 dimensions). Inference runs on the
//!   blocking pool, batched, with a small semaphore bounding concurrency.
//! - [`HashEmbedProvider`]: deterministic hashed bag-of-words vectors for
//!   tests and offline use.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docvault_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["first document".to_string(), "second document".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("{} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Preprocessing
//!
//! All providers run the same [`preprocess`](provider::preprocess) step:
//! whitespace runs collapse to single spaces and text is truncated to the
//! model's character budget (≈4 chars per token) on a char boundary. Because
//! the step lives here, document-level and chunk-level callers can never
//! drift apart in how they prepare text.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use hashing::HashEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, l2_normalize, preprocess};

//! Text chunking for semantic document retrieval.
//!
//! This crate splits document text into addressable segments ("chunks") that
//! can be embedded and searched independently. It is the first stage of the
//! docvault indexing pipeline: raw text goes in, an ordered sequence of
//! chunks with absolute byte offsets comes out, and those offsets are later
//! used to reconstruct snippets for search results.
//!
//! Three strategies are supported, selected per document:
//!
//! - [`ChunkStrategy::Paragraph`]: split on blank-line boundaries, dropping
//!   segments shorter than the configured minimum.
//! - [`ChunkStrategy::SentenceGroup`]: accumulate whole sentences until the
//!   maximum chunk length is reached, never splitting mid-sentence.
//! - [`ChunkStrategy::SlidingWindow`]: fixed-size windows with a configurable
//!   overlap so context spanning a boundary appears in both neighbors.
//!
//! Chunking is deterministic: the same input text and strategy always yield
//! the same offsets and chunk sequence.
//!
//! ```
//! use docvault_chunk::{Chunker, ChunkerConfig, ChunkStrategy};
//!
//! let chunker = Chunker::new(ChunkStrategy::Paragraph, ChunkerConfig::default());
//! let text = "First paragraph with enough text to clear the minimum length filter.\n\n\
//!             Second paragraph, also comfortably longer than fifty characters.";
//! let chunks = chunker.chunk(text);
//!
//! assert_eq!(chunks.len(), 2);
//! for chunk in &chunks {
//!     // Offsets are absolute, so the original text slices back out.
//!     assert_eq!(&text[chunk.start..chunk.end], chunk.text);
//! }
//! ```

pub mod chunker;

pub use chunker::{Chunk, ChunkStrategy, Chunker, ChunkerConfig};

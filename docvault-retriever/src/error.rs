//! Error types for the retrieval engine.
//!
//! Validation and model-availability problems surface synchronously to the
//! caller. Persistence and consistency problems do not: a corrupt artifact
//! is recovered by starting with an empty index, and a slot without a
//! metadata record is logged and skipped, so neither appears here.

use docvault_embed::EmbedError;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Error type for all retrieval operations.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// A vector's length does not match the index dimension.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A malformed request (empty query, empty document id, zero top_k, ...).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The embedding backend failed; the request is rejected rather than
    /// degraded so "no matches" is never confused with "subsystem failure".
    #[error("embedding backend unavailable: {source}")]
    ModelUnavailable {
        #[source]
        source: EmbedError,
    },

    /// A mutation was attempted while a rebuild swap is in flight; retry.
    #[error("index rebuild already in progress")]
    RebuildInProgress,

    /// IO errors from artifact persistence.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetrieverError {
    /// Create an invalid-request error with a custom message.
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Map an embedding failure onto the retrieval taxonomy.
///
/// Empty input is the caller's fault (validation); everything else means the
/// backend is unavailable.
pub fn map_embed_error(source: EmbedError) -> RetrieverError {
    match source {
        EmbedError::EmptyInput => RetrieverError::invalid_request("cannot embed empty text"),
        other => RetrieverError::ModelUnavailable { source: other },
    }
}

//! Error types for embedding generation

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Callers must always receive an explicit failure signal: no code path in
/// this crate substitutes a zero or default vector when generation fails,
/// so downstream ranking logic is never silently corrupted.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding backend could not be loaded or reached.
    #[error("embedding model unavailable: {source}")]
    ModelUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// Error when the provider configuration is invalid
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Input text was empty (or whitespace-only) after preprocessing.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("external error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model-unavailable error from any error type.
    pub fn model_unavailable<E>(source: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::ModelUnavailable {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

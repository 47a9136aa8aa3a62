//! Error types for the `buddy-rag` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding model or word table could not be loaded.
    ///
    /// Raised only while constructing a provider, never per call.
    #[error("Model load error ({provider}): {message}")]
    ModelLoad {
        /// The embedding provider being constructed.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A persisted embedding or metadata blob could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Two vectors that must share a dimension did not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension already established for the index or provider.
        expected: usize,
        /// The offending dimension.
        actual: usize,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the engine orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::EmbeddingError { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn model_load(provider: &str, message: impl Into<String>) -> Self {
        RagError::ModelLoad { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn store(backend: &str, message: impl Into<String>) -> Self {
        RagError::VectorStoreError { backend: backend.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

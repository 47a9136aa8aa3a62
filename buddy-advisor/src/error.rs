//! Error types for the `buddy-advisor` crate.

use buddy_rag::RagError;
use thiserror::Error;

use crate::source::SourceError;

/// Errors returned by [`RagService`](crate::RagService).
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// No user is signed in.
    #[error("no authenticated user")]
    NotAuthenticated,

    /// The retrieval core failed.
    #[error(transparent)]
    Rag(#[from] RagError),

    /// An external record source or blob store failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The text generation capability failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The operation was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The service was misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A convenience result type for advisor operations.
pub type Result<T> = std::result::Result<T, AdvisorError>;

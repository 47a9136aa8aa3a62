//! Text generation boundary.

use async_trait::async_trait;
use thiserror::Error;

/// A failed generation call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GenerationError(pub String);

/// A language model that answers an assembled prompt.
///
/// # Example
///
/// ```rust,ignore
/// let answer = service.ask("u1", "Can I afford a trip?", &my_llm).await?;
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// A [`TextGenerator`] that echoes the prompt back, for demos and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(prompt.to_string())
    }
}

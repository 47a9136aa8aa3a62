//! Configuration for the retrieval engine.

use serde::{Deserialize, Serialize};

use crate::chunking::{DEFAULT_MAX_CHARS, UPLOAD_MAX_CHARS};
use crate::error::{RagError, Result};

/// Default number of hits returned by retrieval.
pub const DEFAULT_TOP_K: usize = 6;

/// Configuration parameters for [`RagEngine`](crate::RagEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunk bound for ingested documents, in grapheme clusters.
    pub max_chunk_chars: usize,
    /// Chunk bound for text extracted from uploads.
    pub upload_chunk_chars: usize,
    /// Number of hits returned when the caller does not specify one.
    pub top_k: usize,
    /// Hits scoring below this are dropped. `None` keeps every hit.
    pub similarity_threshold: Option<f32>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHARS,
            upload_chunk_chars: UPLOAD_MAX_CHARS,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the JSON is malformed or a value
    /// fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RagConfig = serde_json::from_str(json)
            .map_err(|e| RagError::ConfigError(format!("invalid RAG config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every bound is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(RagError::ConfigError(
                "max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if self.upload_chunk_chars == 0 {
            return Err(RagError::ConfigError(
                "upload_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if let Some(threshold) = self.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(RagError::ConfigError(format!(
                    "similarity_threshold ({threshold}) must lie in [-1, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the chunk bound for ingested documents.
    pub fn max_chunk_chars(mut self, chars: usize) -> Self {
        self.config.max_chunk_chars = chars;
        self
    }

    /// Set the chunk bound for upload content.
    pub fn upload_chunk_chars(mut self, chars: usize) -> Self {
        self.config.upload_chunk_chars = chars;
        self
    }

    /// Set the default number of hits.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Drop hits scoring below `threshold`.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `max_chunk_chars == 0` or `upload_chunk_chars == 0`
    /// - `top_k == 0`
    /// - `similarity_threshold` lies outside `[-1, 1]`
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chunking_constants() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.max_chunk_chars, 800);
        assert_eq!(config.upload_chunk_chars, 500);
        assert_eq!(config.top_k, 6);
        assert_eq!(config.similarity_threshold, None);
    }

    #[test]
    fn zero_bounds_are_rejected() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().max_chunk_chars(0).build().is_err());
        assert!(RagConfig::builder().upload_chunk_chars(0).build().is_err());
        assert!(RagConfig::builder().similarity_threshold(1.5).build().is_err());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = RagConfig::from_json_str(r#"{"top_k": 3, "similarity_threshold": 0.2}"#)
            .unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.similarity_threshold, Some(0.2));
        assert_eq!(config.max_chunk_chars, 800);

        assert!(RagConfig::from_json_str(r#"{"top_k": 0}"#).is_err());
        assert!(RagConfig::from_json_str("not json").is_err());
    }
}

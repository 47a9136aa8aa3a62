//! Configuration for the advisor service.

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// MIME types whose uploads are downloaded and indexed as text.
pub const DEFAULT_TEXT_MIME_TYPES: &[&str] =
    &["text/plain", "text/csv", "application/json", "application/xml", "text/html"];

/// Largest upload downloaded for indexing.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Configuration parameters for [`RagService`](crate::RagService).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Hits retrieved per prompt.
    pub top_k: usize,
    /// Download limit for upload content.
    pub max_upload_bytes: usize,
    /// MIME types treated as text.
    pub text_mime_types: Vec<String>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            top_k: buddy_rag::config::DEFAULT_TOP_K,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            text_mime_types: DEFAULT_TEXT_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl AdvisorConfig {
    /// Create a new builder for constructing an [`AdvisorConfig`].
    pub fn builder() -> AdvisorConfigBuilder {
        AdvisorConfigBuilder::default()
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AdvisorConfig = serde_json::from_str(json)
            .map_err(|e| AdvisorError::Config(format!("invalid advisor config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every bound is usable.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(AdvisorError::Config("top_k must be greater than zero".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(AdvisorError::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether uploads of `mime_type` carry indexable text.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn is_text_mime(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        self.text_mime_types.iter().any(|m| m.eq_ignore_ascii_case(essence))
    }
}

/// Builder for constructing a validated [`AdvisorConfig`].
#[derive(Debug, Clone, Default)]
pub struct AdvisorConfigBuilder {
    config: AdvisorConfig,
}

impl AdvisorConfigBuilder {
    /// Set the number of hits per prompt.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the upload download limit.
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Replace the list of text MIME types.
    pub fn text_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.text_mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Build the [`AdvisorConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Config`] if `top_k` or `max_upload_bytes` is zero.
    pub fn build(self) -> Result<AdvisorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AdvisorConfig::default();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert!(config.is_text_mime("text/csv"));
        assert!(config.is_text_mime("Text/Plain; charset=utf-8"));
        assert!(!config.is_text_mime("application/pdf"));
    }

    #[test]
    fn json_overrides_and_validation() {
        let config = AdvisorConfig::from_json_str(r#"{"top_k": 2}"#).unwrap();
        assert_eq!(config.top_k, 2);
        assert_eq!(config.text_mime_types.len(), 5);

        assert!(AdvisorConfig::from_json_str(r#"{"max_upload_bytes": 0}"#).is_err());
        assert!(AdvisorConfig::builder().top_k(0).build().is_err());
    }
}

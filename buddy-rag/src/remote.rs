//! Remote embedding provider speaking the OpenAI-compatible embeddings API.
//!
//! This module is only available when the `remote` feature is enabled.
//!
//! The wire contract is `POST {base_url}/embeddings` with
//! `{"model", "input": [...], "dimensions"?}` and a `{"data": [{"embedding",
//! "index"}]}` response. OpenAI serves it, and so does llama.cpp's
//! `llama-server --embeddings`, which covers locally hosted GGUF models.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

const PROVIDER: &str = "Remote";

/// The default base URL (a local `llama-server`).
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";

/// Connection settings for [`RemoteEmbeddingProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEmbeddingConfig {
    /// Base URL without the trailing `/embeddings`.
    pub base_url: String,
    /// Model name sent with each request.
    pub model: String,
    /// Bearer token, if the server requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Expected embedding dimension.
    pub dimensions: usize,
    /// Send `dimensions` in the request (Matryoshka truncation).
    #[serde(default)]
    pub request_dimensions: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RemoteEmbeddingConfig {
    /// Create a config for `model` producing `dimensions`-sized vectors.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            dimensions,
            request_dimensions: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Ask the server to truncate to `dimensions`.
    pub fn with_request_dimensions(mut self) -> Self {
        self.request_dimensions = true;
        self
    }
}

/// An [`EmbeddingProvider`] backed by a remote HTTP embeddings endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use buddy_rag::remote::{RemoteEmbeddingConfig, RemoteEmbeddingProvider};
///
/// let config = RemoteEmbeddingConfig::new("http://127.0.0.1:8080/v1", "nomic-embed-text", 768);
/// let provider = RemoteEmbeddingProvider::connect(config).await?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    config: RemoteEmbeddingConfig,
}

impl RemoteEmbeddingProvider {
    /// Validate `config` and build the HTTP client without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] for an empty URL or model name, zero
    /// dimensions, or a client that cannot be built.
    pub fn new(config: RemoteEmbeddingConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(RagError::model_load(PROVIDER, "base_url must not be empty"));
        }
        if config.model.trim().is_empty() {
            return Err(RagError::model_load(PROVIDER, "model must not be empty"));
        }
        if config.dimensions == 0 {
            return Err(RagError::model_load(PROVIDER, "dimensions must be greater than zero"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::model_load(PROVIDER, format!("failed to build client: {e}")))?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self { client, endpoint, config })
    }

    /// Build the provider and verify the model with one warm-up request.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the server is unreachable, rejects
    /// the model, or returns vectors of the wrong dimension.
    pub async fn connect(config: RemoteEmbeddingConfig) -> Result<Self> {
        let provider = Self::new(config)?;
        provider
            .embed("warm-up")
            .await
            .map_err(|e| RagError::model_load(PROVIDER, format!("warm-up request failed: {e}")))?;
        info!(
            provider = PROVIDER,
            endpoint = %provider.endpoint,
            model = %provider.config.model,
            dimensions = provider.config.dimensions,
            "remote embedding backend ready"
        );
        Ok(provider)
    }

    /// Build a config from `BUDDY_EMBEDDINGS_URL`, `BUDDY_EMBEDDINGS_MODEL`,
    /// `BUDDY_EMBEDDINGS_DIMENSIONS` and optional `BUDDY_EMBEDDINGS_API_KEY`.
    pub fn config_from_env() -> Result<RemoteEmbeddingConfig> {
        let base_url =
            std::env::var("BUDDY_EMBEDDINGS_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("BUDDY_EMBEDDINGS_MODEL").map_err(|_| {
            RagError::model_load(PROVIDER, "BUDDY_EMBEDDINGS_MODEL environment variable not set")
        })?;
        let dimensions = std::env::var("BUDDY_EMBEDDINGS_DIMENSIONS")
            .map_err(|_| {
                RagError::model_load(
                    PROVIDER,
                    "BUDDY_EMBEDDINGS_DIMENSIONS environment variable not set",
                )
            })?
            .parse::<usize>()
            .map_err(|e| RagError::model_load(PROVIDER, format!("invalid dimensions: {e}")))?;

        let mut config = RemoteEmbeddingConfig::new(base_url, model, dimensions);
        if let Ok(key) = std::env::var("BUDDY_EMBEDDINGS_API_KEY") {
            config = config.with_api_key(key);
        }
        Ok(config)
    }

    /// Connect using [`config_from_env`](Self::config_from_env).
    pub async fn from_env() -> Result<Self> {
        Self::connect(Self::config_from_env()?).await
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Order response rows by `index` and check them against the request.
fn collect_embeddings(
    mut data: Vec<EmbeddingData>,
    expected_count: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected_count {
        return Err(RagError::embedding(
            PROVIDER,
            format!("API returned {} embeddings for {expected_count} inputs", data.len()),
        ));
    }
    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() != dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: dimensions,
                    actual: d.embedding.len(),
                });
            }
            let mut v = d.embedding;
            l2_normalize(&mut v);
            Ok(v)
        })
        .collect()
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.config.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.config.model,
            input: texts.to_vec(),
            dimensions: self.config.request_dimensions.then_some(self.config.dimensions),
        };

        let mut request = self.client.post(&self.endpoint).json(&request_body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            RagError::embedding(PROVIDER, format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::embedding(PROVIDER, format!("API returned {status}: {detail}")));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        collect_embeddings(embedding_response.data, texts.len(), self.config.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

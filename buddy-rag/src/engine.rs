//! Retrieval engine orchestrator.
//!
//! The [`RagEngine`] coordinates the ingest-and-retrieve workflow by
//! composing an [`EmbeddingProvider`] and a [`VectorStore`] with the
//! paragraph-then-sentence [`Chunker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use buddy_rag::{RagEngine, RagConfig, InMemoryVectorStore, Document};
//!
//! let engine = RagEngine::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! engine.ingest("u1", &Document::new("u1", statement_text, "statement")).await?;
//! let hits = engine.retrieve("u1", "how much did I spend on food?", None).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, grapheme_len};
use crate::config::RagConfig;
use crate::document::{Chunk, ChunkMetadata, Document, Hit, chunk_id};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Per-call ingestion overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Chunk bound; `None` uses [`RagConfig::max_chunk_chars`].
    pub max_chars: Option<usize>,
    /// Text prepended to every chunk before it is embedded and stored.
    ///
    /// The prefix counts against the chunk bound, so a prefixed chunk is no
    /// longer than `max_chars` unless one word alone exceeds the remainder.
    pub chunk_prefix: Option<String>,
}

impl IngestOptions {
    /// Chunk with an explicit bound.
    pub fn max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    /// Prefix every chunk with `prefix`.
    pub fn chunk_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.chunk_prefix = Some(prefix.into());
        self
    }
}

/// The retrieval engine.
///
/// Coordinates document ingestion (chunk → embed → replace) and retrieval
/// (embed → search → filter). Construct one via [`RagEngine::builder()`].
pub struct RagEngine {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("config", &self.config)
            .field("embedding_provider", &self.embedding_provider.name())
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest a document for `user_id`: chunk → embed → replace.
    ///
    /// Every chunk previously stored for the document is replaced, so
    /// re-ingesting a shorter version leaves no stale chunks. Returns the
    /// chunks that were stored (with embeddings attached).
    ///
    /// # Errors
    ///
    /// Any embedding or storage failure is returned and nothing is written
    /// for the document. A provider that returns the wrong number of
    /// vectors, or vectors of the wrong dimension, fails with
    /// [`RagError::EmbeddingError`].
    pub async fn ingest(&self, user_id: &str, document: &Document) -> Result<Vec<Chunk>> {
        self.ingest_with(user_id, document, &IngestOptions::default()).await
    }

    /// Like [`ingest`](Self::ingest) with an explicit chunk bound.
    pub async fn ingest_with_max_chars(
        &self,
        user_id: &str,
        document: &Document,
        max_chars: usize,
    ) -> Result<Vec<Chunk>> {
        self.ingest_with(user_id, document, &IngestOptions::default().max_chars(max_chars)).await
    }

    /// Like [`ingest`](Self::ingest) with per-call overrides.
    pub async fn ingest_with(
        &self,
        user_id: &str,
        document: &Document,
        options: &IngestOptions,
    ) -> Result<Vec<Chunk>> {
        let max_chars = options.max_chars.unwrap_or(self.config.max_chunk_chars);
        if max_chars == 0 {
            return Err(RagError::ChunkingError("max_chars must be greater than zero".to_string()));
        }

        // 1. Chunk the document, leaving room for the prefix
        let prefix_len = options.chunk_prefix.as_deref().map_or(0, grapheme_len);
        let budget = max_chars.saturating_sub(prefix_len).max(1);
        let mut pieces = Chunker::new(budget).chunk(&document.text);
        if let Some(prefix) = &options.chunk_prefix {
            for piece in &mut pieces {
                piece.insert_str(0, prefix);
            }
        }

        // 2. Generate embeddings in one batch
        let texts: Vec<&str> = pieces.iter().map(String::as_str).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(user_id, doc_id = %document.id, error = %e, "embedding failed during ingestion");
        })?;
        self.check_embeddings(&document.id, pieces.len(), &embeddings)?;

        // 3. Attach embeddings to chunks
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(idx, (text, embedding))| Chunk {
                id: chunk_id(user_id, &document.id, idx),
                user_id: user_id.to_string(),
                doc_id: document.id.clone(),
                text,
                metadata: ChunkMetadata::new(document.source.clone(), idx),
                embedding: Some(embedding),
            })
            .collect();

        // 4. Replace the document's chunks
        self.vector_store.replace_document(user_id, &document.id, &chunks).await.inspect_err(
            |e| {
                error!(user_id, doc_id = %document.id, error = %e, "store write failed during ingestion");
            },
        )?;

        info!(
            user_id,
            doc_id = %document.id,
            source = %document.source,
            chunk_count = chunks.len(),
            "ingested document"
        );
        Ok(chunks)
    }

    fn check_embeddings(&self, doc_id: &str, expected: usize, embeddings: &[Vec<f32>]) -> Result<()> {
        let provider = self.embedding_provider.name();
        if embeddings.len() != expected {
            error!(doc_id, expected, actual = embeddings.len(), "embedding count mismatch");
            return Err(RagError::embedding(
                provider,
                format!(
                    "returned {} embeddings for {expected} chunks of document '{doc_id}'",
                    embeddings.len()
                ),
            ));
        }

        let dimensions = self.embedding_provider.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            error!(doc_id, expected = dimensions, actual = bad.len(), "embedding dimension mismatch");
            return Err(RagError::embedding(
                provider,
                format!(
                    "returned a {}-dimensional embedding, provider declares {dimensions}",
                    bad.len()
                ),
            ));
        }
        Ok(())
    }

    /// Retrieve the chunks of `user_id` most relevant to `query`.
    ///
    /// `top_k` defaults to [`RagConfig::top_k`]. Hits below the configured
    /// similarity threshold, if any, are dropped.
    ///
    /// # Errors
    ///
    /// Returns the provider or store error if embedding or search fails.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<Hit>> {
        let top_k = top_k.unwrap_or(self.config.top_k);

        // 1. Embed the query
        let query_embedding = self.embedding_provider.embed(query).await.inspect_err(|e| {
            error!(user_id, error = %e, "embedding failed during retrieval");
        })?;

        // 2. Search the tenant's chunks
        let hits = self.vector_store.search(user_id, &query_embedding, top_k).await.inspect_err(
            |e| {
                error!(user_id, error = %e, "vector store search failed");
            },
        )?;

        // 3. Filter by similarity threshold
        let hits: Vec<Hit> = match self.config.similarity_threshold {
            Some(threshold) => hits.into_iter().filter(|h| h.score >= threshold).collect(),
            None => hits,
        };

        info!(user_id, top_k, hit_count = hits.len(), "retrieval completed");
        Ok(hits)
    }

    /// Retrieve context for `query` and render a draft-answer prompt.
    ///
    /// No model is called; the returned string is meant to be handed to one.
    pub async fn draft_answer(
        &self,
        user_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<String> {
        let hits = self.retrieve(user_id, query, top_k).await?;
        Ok(render_draft(query, &hits))
    }

    /// Remove every chunk indexed for `user_id`.
    pub async fn clear_user(&self, user_id: &str) -> Result<usize> {
        let removed = self.vector_store.delete_user(user_id).await?;
        info!(user_id, removed, "cleared tenant index");
        Ok(removed)
    }
}

/// Bullet list of hit texts, one per line.
pub fn context_block(hits: &[Hit]) -> String {
    hits.iter().map(|h| format!("• {}", h.chunk.text)).collect::<Vec<_>>().join("\n")
}

fn render_draft(query: &str, hits: &[Hit]) -> String {
    format!(
        "Question: {query}\n\n\
         Relevant context:\n\
         {}\n\n\
         Draft answer (fill with your LLM or template):\n\
         Based on your data, here are the key points above. If you'd like, I can run \
         projections on goals and suggest small category cuts to reach them sooner.",
        context_block(hits)
    )
}

/// Builder for constructing a [`RagEngine`].
///
/// `config` defaults to [`RagConfig::default()`]; the embedding provider and
/// vector store are required.
///
/// # Example
///
/// ```rust,ignore
/// let engine = RagEngine::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Build the [`RagEngine`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the config fails validation.
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        Ok(RagEngine { config, embedding_provider, vector_store })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChunkMetadata, DocumentSource};

    #[test]
    fn draft_lists_each_hit_as_a_bullet() {
        let hit = |text: &str| Hit {
            chunk: Chunk {
                id: "u:d:0".into(),
                user_id: "u".into(),
                doc_id: "d".into(),
                text: text.into(),
                metadata: ChunkMetadata::new(DocumentSource::Goals, 0),
                embedding: None,
            },
            score: 0.9,
        };
        let draft = render_draft("How am I doing?", &[hit("Goal: Trip."), hit("Goal: Car.")]);
        assert!(draft.starts_with("Question: How am I doing?\n\nRelevant context:\n"));
        assert!(draft.contains("• Goal: Trip.\n• Goal: Car.\n\nDraft answer"));
        assert!(draft.ends_with("reach them sooner."));
    }
}

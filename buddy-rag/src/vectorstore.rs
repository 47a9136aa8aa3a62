//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{Chunk, DocumentSource, Hit};
use crate::error::{RagError, Result};

/// A tenant-scoped storage backend for chunk embeddings with similarity search.
///
/// Every read and delete is keyed by `user_id`; no operation ever returns or
/// removes another tenant's chunks.
///
/// # Example
///
/// ```rust,ignore
/// use buddy_rag::{SqliteVectorStore, VectorStore};
///
/// let store = SqliteVectorStore::open("buddy.db").await?;
/// store.replace_document("u1", "doc-1", &chunks).await?;
/// let hits = store.search("u1", &query_embedding, 6).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace one chunk by id.
    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        self.upsert_many(std::slice::from_ref(chunk)).await
    }

    /// Insert or replace many chunks. Either all are written or none are.
    ///
    /// Chunks must have embeddings set.
    async fn upsert_many(&self, chunks: &[Chunk]) -> Result<()>;

    /// Return up to `top_k` of `user_id`'s chunks most similar to `query`,
    /// ordered by descending score.
    async fn search(&self, user_id: &str, query: &[f32], top_k: usize) -> Result<Vec<Hit>>;

    /// Atomically replace every chunk of one document with `chunks`.
    async fn replace_document(&self, user_id: &str, doc_id: &str, chunks: &[Chunk])
    -> Result<()>;

    /// Delete every chunk of one document. Returns the number removed.
    async fn delete_document(&self, user_id: &str, doc_id: &str) -> Result<usize>;

    /// Distinct document ids indexed for `user_id`, sorted.
    async fn document_ids(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.document_sources(user_id).await?.into_iter().map(|(id, _)| id).collect())
    }

    /// Distinct `(doc_id, source)` pairs indexed for `user_id`, sorted by id.
    async fn document_sources(&self, user_id: &str) -> Result<Vec<(String, DocumentSource)>>;

    /// Delete every chunk of `user_id`. Returns the number removed.
    async fn delete_user(&self, user_id: &str) -> Result<usize>;

    /// Number of chunks indexed for `user_id`.
    async fn count(&self, user_id: &str) -> Result<usize>;
}

/// Cosine similarity of two `f32` vectors.
///
/// Returns 0.0 if either vector has zero magnitude. Vectors of different
/// length are compared over their common prefix; stores check dimensions
/// before calling this.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Cosine similarity of two `f64` vectors.
pub fn cosine_similarity_f64(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort hits by descending score and keep the best `top_k`.
pub(crate) fn rank(mut hits: Vec<Hit>, top_k: usize) -> Vec<Hit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k);
    hits
}

/// Borrow a chunk's embedding, rejecting chunks that have none.
pub(crate) fn require_embedding<'a>(backend: &str, chunk: &'a Chunk) -> Result<&'a [f32]> {
    chunk
        .embedding
        .as_deref()
        .ok_or_else(|| RagError::store(backend, format!("chunk '{}' has no embedding", chunk.id)))
}

/// Check that every chunk in a batch has an embedding of one shared
/// dimension, and that it matches `expected` when given.
pub(crate) fn batch_dimensions(
    backend: &str,
    chunks: &[Chunk],
    expected: Option<usize>,
) -> Result<Option<usize>> {
    let mut dimensions = expected;
    for chunk in chunks {
        let len = require_embedding(backend, chunk)?.len();
        if len == 0 {
            return Err(RagError::store(
                backend,
                format!("chunk '{}' has an empty embedding", chunk.id),
            ));
        }
        match dimensions {
            None => dimensions = Some(len),
            Some(d) if d != len => {
                return Err(RagError::DimensionMismatch { expected: d, actual: len });
            }
            Some(_) => {}
        }
    }
    Ok(dimensions)
}

/// Reject chunks whose `doc_id` or `user_id` differ from the target document.
pub(crate) fn check_document_scope(
    backend: &str,
    user_id: &str,
    doc_id: &str,
    chunks: &[Chunk],
) -> Result<()> {
    match chunks.iter().find(|c| c.user_id != user_id || c.doc_id != doc_id) {
        Some(stray) => Err(RagError::store(
            backend,
            format!("chunk '{}' does not belong to document '{user_id}/{doc_id}'", stray.id),
        )),
        None => Ok(()),
    }
}

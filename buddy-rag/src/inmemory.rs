//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! per-tenant `HashMap` protected by a `tokio::sync::RwLock`. Vectors are
//! widened to `f64` and held as [`IndexedChunk`]s. It serves as the
//! transient per-session cache and as the store used in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, DocumentSource, Hit, IndexedChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{
    VectorStore, batch_dimensions, check_document_scope, cosine_similarity_f64, rank,
    require_embedding,
};

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine similarity for search.
///
/// Tenants are stored as `user_id → Vec<IndexedChunk>`. All operations are
/// async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use buddy_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert_many(&chunks).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tenants: HashMap<String, Vec<IndexedChunk>>,
    dimensions: Option<usize>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of one tenant's indexed chunks, in insertion order.
    pub async fn indexed_chunks(&self, user_id: &str) -> Vec<IndexedChunk> {
        self.inner.read().await.tenants.get(user_id).cloned().unwrap_or_default()
    }
}

fn to_indexed(chunk: &Chunk) -> Result<IndexedChunk> {
    let embedding = require_embedding(BACKEND, chunk)?;
    Ok(IndexedChunk {
        id: chunk.id.clone(),
        user_id: chunk.user_id.clone(),
        doc_id: chunk.doc_id.clone(),
        metadata: chunk.metadata.clone(),
        text: chunk.text.clone(),
        vector: embedding.iter().map(|v| f64::from(*v)).collect(),
    })
}

impl Inner {
    /// Validate and convert a batch before any mutation.
    fn prepare(&self, chunks: &[Chunk]) -> Result<(Option<usize>, Vec<IndexedChunk>)> {
        let dimensions = batch_dimensions(BACKEND, chunks, self.dimensions)?;
        let indexed = chunks.iter().map(to_indexed).collect::<Result<Vec<_>>>()?;
        Ok((dimensions, indexed))
    }

    fn insert(&mut self, indexed: Vec<IndexedChunk>) {
        for chunk in indexed {
            let tenant = self.tenants.entry(chunk.user_id.clone()).or_default();
            match tenant.iter_mut().find(|c| c.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => tenant.push(chunk),
            }
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_many(&self, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let (dimensions, indexed) = inner.prepare(chunks)?;
        inner.dimensions = dimensions;
        inner.insert(indexed);
        Ok(())
    }

    async fn search(&self, user_id: &str, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let Some(tenant) = inner.tenants.get(user_id) else {
            return Ok(Vec::new());
        };
        match inner.dimensions {
            Some(expected) if !tenant.is_empty() && expected != query.len() => {
                return Err(RagError::DimensionMismatch { expected, actual: query.len() });
            }
            _ => {}
        }

        let query: Vec<f64> = query.iter().map(|v| f64::from(*v)).collect();
        let hits: Vec<Hit> = tenant
            .iter()
            .map(|chunk| {
                let score = cosine_similarity_f64(&chunk.vector, &query) as f32;
                Hit { chunk: chunk.to_chunk(), score }
            })
            .collect();

        let hits = rank(hits, top_k);
        debug!(backend = BACKEND, user_id, hit_count = hits.len(), "search");
        Ok(hits)
    }

    async fn replace_document(
        &self,
        user_id: &str,
        doc_id: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        check_document_scope(BACKEND, user_id, doc_id, chunks)?;

        let mut inner = self.inner.write().await;
        let (dimensions, indexed) = inner.prepare(chunks)?;
        inner.dimensions = dimensions;
        if let Some(tenant) = inner.tenants.get_mut(user_id) {
            tenant.retain(|c| c.doc_id != doc_id);
        }
        inner.insert(indexed);
        Ok(())
    }

    async fn delete_document(&self, user_id: &str, doc_id: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let Some(tenant) = inner.tenants.get_mut(user_id) else {
            return Ok(0);
        };
        let before = tenant.len();
        tenant.retain(|c| c.doc_id != doc_id);
        Ok(before - tenant.len())
    }

    async fn document_sources(&self, user_id: &str) -> Result<Vec<(String, DocumentSource)>> {
        let inner = self.inner.read().await;
        let mut docs: Vec<(String, DocumentSource)> = inner
            .tenants
            .get(user_id)
            .map(|tenant| {
                tenant.iter().map(|c| (c.doc_id.clone(), c.metadata.source.clone())).collect()
            })
            .unwrap_or_default();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs.dedup_by(|a, b| a.0 == b.0);
        Ok(docs)
    }

    async fn delete_user(&self, user_id: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        Ok(inner.tenants.remove(user_id).map_or(0, |tenant| tenant.len()))
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.get(user_id).map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChunkMetadata, chunk_id};

    fn chunk(user: &str, doc: &str, idx: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: chunk_id(user, doc, idx),
            user_id: user.to_string(),
            doc_id: doc.to_string(),
            text: format!("{doc} part {idx}"),
            metadata: ChunkMetadata::new(DocumentSource::Expenses, idx),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_tenant() {
        let store = InMemoryVectorStore::new();
        store.upsert(&chunk("a", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert(&chunk("b", "doc", 0, vec![1.0, 0.0])).await.unwrap();

        let hits = store.search("a", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.user_id, "a");
        assert!(store.search("nobody", &[1.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        store.upsert(&chunk("a", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert(&chunk("a", "doc", 0, vec![0.0, 1.0])).await.unwrap();

        let chunks = store.indexed_chunks("a").await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn top_k_zero_returns_nothing() {
        let store = InMemoryVectorStore::new();
        store.upsert(&chunk("a", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        assert!(store.search("a", &[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_of_wrong_dimension_is_an_error() {
        let store = InMemoryVectorStore::new();
        store.upsert(&chunk("a", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        let err = store.search("a", &[1.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn mixed_batch_is_rejected_whole() {
        let store = InMemoryVectorStore::new();
        let batch = vec![chunk("a", "doc", 0, vec![1.0, 0.0]), chunk("a", "doc", 1, vec![1.0])];
        assert!(store.upsert_many(&batch).await.is_err());
        assert_eq!(store.count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_and_delete_document() {
        let store = InMemoryVectorStore::new();
        let chunks: Vec<Chunk> = (0..3).map(|i| chunk("a", "doc", i, vec![1.0, i as f32])).collect();
        store.replace_document("a", "doc", &chunks).await.unwrap();
        store.upsert(&chunk("a", "other", 0, vec![0.0, 1.0])).await.unwrap();

        store.replace_document("a", "doc", &chunks[..2]).await.unwrap();
        assert_eq!(store.count("a").await.unwrap(), 3);
        assert_eq!(store.document_ids("a").await.unwrap(), vec!["doc", "other"]);
        assert_eq!(
            store.document_sources("a").await.unwrap(),
            vec![
                ("doc".to_string(), DocumentSource::Expenses),
                ("other".to_string(), DocumentSource::Expenses)
            ]
        );

        assert_eq!(store.delete_document("a", "doc").await.unwrap(), 2);
        assert_eq!(store.delete_user("a").await.unwrap(), 1);
        assert_eq!(store.count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_chunks_from_another_document() {
        let store = InMemoryVectorStore::new();
        let stray = chunk("a", "elsewhere", 0, vec![1.0, 0.0]);
        assert!(store.replace_document("a", "doc", &[stray]).await.is_err());
    }
}

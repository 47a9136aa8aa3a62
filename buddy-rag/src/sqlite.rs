//! SQLite-backed vector store.
//!
//! This module is only available when the `sqlite` feature is enabled.
//!
//! Chunks live in one `rag_chunks` table keyed by chunk id and indexed by
//! tenant. Search is a brute-force cosine scan over one tenant's rows, which
//! stays fast for the few thousand chunks a single user produces.
//!
//! A `rag_meta` table records the embedding byte layout and the index
//! dimension so that a database written by an incompatible build, or mixed
//! with a different embedding model, is rejected instead of misread.
//!
//! Writers are serialized inside the store. A deferred transaction that
//! reads `rag_meta` and then writes fails with `SQLITE_BUSY` if another
//! connection committed in between, and the busy timeout does not cover that
//! upgrade.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::codec::{EMBEDDING_FORMAT, decode_embedding, encode_embedding};
use crate::document::{Chunk, ChunkMetadata, DocumentSource, Hit};
use crate::error::{RagError, Result};
use crate::vectorstore::{
    VectorStore, batch_dimensions, check_document_scope, cosine_similarity, rank,
    require_embedding,
};

const BACKEND: &str = "SQLite";

const META_FORMAT: &str = "embedding_format";
const META_DIMENSIONS: &str = "dimensions";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn db_error(e: sqlx::Error) -> RagError {
    RagError::store(BACKEND, e.to_string())
}

/// A durable [`VectorStore`] in a single SQLite database file.
///
/// # Example
///
/// ```rust,ignore
/// use buddy_rag::SqliteVectorStore;
///
/// let store = SqliteVectorStore::open("data/buddy.db").await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteVectorStore {
    /// Open (creating if missing) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the database cannot be
    /// opened or was written with a different embedding format.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let store = Self::from_pool(pool).await?;
        info!(backend = BACKEND, path = %path.display(), "opened vector store");
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds a single connection for its whole lifetime, since every
    /// SQLite connection sees its own in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error)?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    ///
    /// Writes through this store are serialized against each other, but not
    /// against other handles writing to the same database file.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool, write_lock: Arc::new(Mutex::new(())) };
        store.init_schema().await?;
        store.check_format().await?;
        Ok(store)
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The index dimension, once the first chunk has been written.
    pub async fn dimensions(&self) -> Result<Option<usize>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        stored_dimensions(&mut *conn).await
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_chunks_user ON rag_chunks(user_id)")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rag_chunks_user_doc ON rag_chunks(user_id, doc_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query("INSERT OR IGNORE INTO rag_meta (key, value) VALUES (?1, ?2)")
            .bind(META_FORMAT)
            .bind(EMBEDDING_FORMAT)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn check_format(&self) -> Result<()> {
        let format: Option<String> =
            sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
                .bind(META_FORMAT)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match format.as_deref() {
            Some(EMBEDDING_FORMAT) => Ok(()),
            Some(other) => Err(RagError::store(
                BACKEND,
                format!("unsupported embedding format '{other}', expected '{EMBEDDING_FORMAT}'"),
            )),
            None => Err(RagError::store(BACKEND, "rag_meta has no embedding_format entry")),
        }
    }
}

async fn stored_dimensions(conn: &mut SqliteConnection) -> Result<Option<usize>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
        .bind(META_DIMENSIONS)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;

    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| RagError::Decode(format!("rag_meta dimensions '{v}': {e}")))
        })
        .transpose()
}

/// Validate a batch against the recorded dimension, recording it on first write.
async fn ensure_dimensions(conn: &mut SqliteConnection, chunks: &[Chunk]) -> Result<()> {
    let recorded = stored_dimensions(conn).await?;
    let batch = batch_dimensions(BACKEND, chunks, recorded)?;

    if let (None, Some(dimensions)) = (recorded, batch) {
        sqlx::query("INSERT OR REPLACE INTO rag_meta (key, value) VALUES (?1, ?2)")
            .bind(META_DIMENSIONS)
            .bind(dimensions.to_string())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        debug!(backend = BACKEND, dimensions, "recorded index dimension");
    }
    Ok(())
}

async fn insert_chunks(conn: &mut SqliteConnection, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        let blob = encode_embedding(require_embedding(BACKEND, chunk)?);
        let metadata = chunk.metadata.to_json()?;

        sqlx::query(
            "INSERT OR REPLACE INTO rag_chunks (id, user_id, doc_id, text, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&chunk.id)
        .bind(&chunk.user_id)
        .bind(&chunk.doc_id)
        .bind(&chunk.text)
        .bind(&metadata)
        .bind(&blob)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }
    Ok(())
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let metadata: String = row.try_get("metadata").map_err(db_error)?;
    let blob: Vec<u8> = row.try_get("embedding").map_err(db_error)?;

    Ok(Chunk {
        id: row.try_get("id").map_err(db_error)?,
        user_id: row.try_get("user_id").map_err(db_error)?,
        doc_id: row.try_get("doc_id").map_err(db_error)?,
        text: row.try_get("text").map_err(db_error)?,
        metadata: ChunkMetadata::from_json(&metadata)?,
        embedding: Some(decode_embedding(&blob)?),
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_many(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        ensure_dimensions(&mut *tx, chunks).await?;
        insert_chunks(&mut *tx, chunks).await?;
        tx.commit().await.map_err(db_error)?;

        debug!(backend = BACKEND, chunk_count = chunks.len(), "upserted chunks");
        Ok(())
    }

    async fn search(&self, user_id: &str, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, user_id, doc_id, text, metadata, embedding
             FROM rag_chunks
             WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            let stored = chunk.embedding.as_deref().unwrap_or_default();
            if stored.len() != query.len() {
                return Err(RagError::DimensionMismatch {
                    expected: stored.len(),
                    actual: query.len(),
                });
            }
            let score = cosine_similarity(query, stored);
            hits.push(Hit { chunk, score });
        }

        let hits = rank(hits, top_k);
        debug!(backend = BACKEND, user_id, scanned = rows.len(), hit_count = hits.len(), "search");
        Ok(hits)
    }

    async fn replace_document(
        &self,
        user_id: &str,
        doc_id: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        check_document_scope(BACKEND, user_id, doc_id, chunks)?;

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        if !chunks.is_empty() {
            ensure_dimensions(&mut *tx, chunks).await?;
        }

        let removed = sqlx::query("DELETE FROM rag_chunks WHERE user_id = ?1 AND doc_id = ?2")
            .bind(user_id)
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        insert_chunks(&mut *tx, chunks).await?;
        tx.commit().await.map_err(db_error)?;

        debug!(
            backend = BACKEND,
            user_id,
            doc_id,
            removed,
            chunk_count = chunks.len(),
            "replaced document"
        );
        Ok(())
    }

    async fn delete_document(&self, user_id: &str, doc_id: &str) -> Result<usize> {
        let _writer = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM rag_chunks WHERE user_id = ?1 AND doc_id = ?2")
            .bind(user_id)
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() as usize)
    }

    async fn document_ids(&self, user_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT doc_id FROM rag_chunks WHERE user_id = ?1 ORDER BY doc_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn document_sources(&self, user_id: &str) -> Result<Vec<(String, DocumentSource)>> {
        // Every chunk of a document carries the same source, so any row will do.
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_id, MIN(metadata) FROM rag_chunks
             WHERE user_id = ?1
             GROUP BY doc_id
             ORDER BY doc_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|(doc_id, metadata)| Ok((doc_id, ChunkMetadata::from_json(&metadata)?.source)))
            .collect()
    }

    async fn delete_user(&self, user_id: &str) -> Result<usize> {
        let _writer = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM rag_chunks WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        info!(backend = BACKEND, user_id, removed = result.rows_affected(), "cleared tenant index");
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::chunk_id;

    fn chunk(user: &str, doc: &str, idx: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: chunk_id(user, doc, idx),
            user_id: user.to_string(),
            doc_id: doc.to_string(),
            text: format!("{doc} part {idx}"),
            metadata: ChunkMetadata::new(DocumentSource::Goals, idx),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.db");

        {
            let store = SqliteVectorStore::open(&path).await.unwrap();
            store.upsert(&chunk("u1", "g1", 0, vec![1.0, 0.0, 0.0])).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteVectorStore::open(&path).await.unwrap();
        assert_eq!(store.count("u1").await.unwrap(), 1);
        assert_eq!(store.dimensions().await.unwrap(), Some(3));

        let hits = store.search("u1", &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata, ChunkMetadata::new(DocumentSource::Goals, 0));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rejects_foreign_embedding_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.db");

        {
            let store = SqliteVectorStore::open(&path).await.unwrap();
            sqlx::query("UPDATE rag_meta SET value = 'f16le-v0' WHERE key = 'embedding_format'")
                .execute(store.pool())
                .await
                .unwrap();
            store.pool().close().await;
        }

        let err = SqliteVectorStore::open(&path).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
    }

    #[tokio::test]
    async fn rejects_a_second_dimension() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        store.upsert(&chunk("u1", "g1", 0, vec![1.0, 0.0])).await.unwrap();

        let err = store.upsert(&chunk("u1", "g2", 0, vec![1.0, 0.0, 0.0])).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));

        let err = store.search("u1", &[1.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn failed_batch_writes_nothing() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let mut missing = chunk("u1", "g1", 1, vec![]);
        missing.embedding = None;
        let batch = vec![chunk("u1", "g1", 0, vec![1.0, 0.0]), missing];

        assert!(store.upsert_many(&batch).await.is_err());
        assert_eq!(store.count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_document_drops_stale_chunks() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let three: Vec<Chunk> = (0..3).map(|i| chunk("u1", "doc", i, vec![1.0, i as f32])).collect();
        store.replace_document("u1", "doc", &three).await.unwrap();
        assert_eq!(store.count("u1").await.unwrap(), 3);

        store.replace_document("u1", "doc", &three[..1]).await.unwrap();
        assert_eq!(store.count("u1").await.unwrap(), 1);
        assert_eq!(store.document_ids("u1").await.unwrap(), vec!["doc".to_string()]);
        assert_eq!(
            store.document_sources("u1").await.unwrap(),
            vec![("doc".to_string(), DocumentSource::Goals)]
        );
    }

    #[tokio::test]
    async fn deletes_are_tenant_scoped() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        store.upsert(&chunk("u1", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert(&chunk("u2", "doc", 0, vec![1.0, 0.0])).await.unwrap();

        assert_eq!(store.delete_document("u1", "doc").await.unwrap(), 1);
        assert_eq!(store.count("u2").await.unwrap(), 1);
        assert_eq!(store.delete_user("u2").await.unwrap(), 1);
        assert_eq!(store.count("u2").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tenants_write_without_locking_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteVectorStore::open(dir.path().join("buddy.db")).await.unwrap());

        let mut tasks = tokio::task::JoinSet::new();
        for tenant in 0..16 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                let user = format!("u{tenant}");
                for round in 0..30 {
                    let doc = format!("doc{}", round % 5);
                    let chunks: Vec<Chunk> =
                        (0..2).map(|i| chunk(&user, &doc, i, vec![1.0, round as f32])).collect();
                    store.replace_document(&user, &doc, &chunks).await?;
                }
                Ok::<_, RagError>(user)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let user = joined.unwrap().unwrap();
            assert_eq!(store.count(&user).await.unwrap(), 10);
        }
        assert_eq!(store.dimensions().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn corrupted_blob_surfaces_as_decode_error() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        store.upsert(&chunk("u1", "doc", 0, vec![1.0, 0.0])).await.unwrap();
        sqlx::query("UPDATE rag_chunks SET embedding = X'0000803F00'")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.search("u1", &[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, RagError::Decode(_)));
    }
}

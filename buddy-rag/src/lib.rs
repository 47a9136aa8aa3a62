//! # buddy-rag
//!
//! Retrieval core for Finance Buddy: text chunking, pluggable embeddings and
//! a per-tenant vector index with brute-force cosine search.
//!
//! ## Overview
//!
//! - [`Chunker`] - paragraph-then-sentence splitting with a grapheme bound
//! - [`EmbeddingProvider`] - text → fixed-dimension vector
//!   - [`WordVectorEmbeddingProvider`] - averaged word vectors (GloVe text format)
//!   - [`OnDeviceEmbeddingProvider`] - an injected local inference model
//!   - [`RemoteEmbeddingProvider`] - OpenAI-compatible HTTP endpoint (feature `remote`)
//! - [`VectorStore`] - tenant-scoped chunk storage and search
//!   - [`SqliteVectorStore`] - durable, one SQLite file (feature `sqlite`)
//!   - [`InMemoryVectorStore`] - per-session cache
//! - [`RagEngine`] - ingest (chunk → embed → replace) and retrieve
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use buddy_rag::{Document, InMemoryVectorStore, RagEngine, WordVectorEmbeddingProvider};
//!
//! let engine = RagEngine::builder()
//!     .embedding_provider(Arc::new(WordVectorEmbeddingProvider::from_path("glove.50d.txt")?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! engine.ingest("u1", &Document::new("u1", "Goal: Emergency Fund.", "goals")).await?;
//! println!("{}", engine.draft_answer("u1", "emergency fund progress", None).await?);
//! ```
//!
//! ## Features
//!
//! | Feature  | Default | Enables |
//! |----------|---------|---------|
//! | `sqlite` | yes     | [`SqliteVectorStore`] via sqlx |
//! | `remote` | no      | [`RemoteEmbeddingProvider`] via reqwest |
//! | `full`   | no      | everything |

pub mod chunking;
pub mod codec;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod inmemory;
pub mod ondevice;
#[cfg(feature = "remote")]
pub mod remote;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod vectorstore;
pub mod wordvec;

pub use chunking::{Chunker, DEFAULT_MAX_CHARS, UPLOAD_MAX_CHARS};
pub use codec::{EMBEDDING_FORMAT, decode_embedding, encode_embedding};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, ChunkMetadata, Document, DocumentSource, Hit, IndexedChunk, chunk_id};
pub use embedding::EmbeddingProvider;
pub use engine::{IngestOptions, RagEngine, RagEngineBuilder, context_block};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use ondevice::{InferenceModel, ModelLoader, OnDeviceEmbeddingProvider, OutputTensor};
#[cfg(feature = "remote")]
pub use remote::{RemoteEmbeddingConfig, RemoteEmbeddingProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;
pub use vectorstore::{VectorStore, cosine_similarity, cosine_similarity_f64};
pub use wordvec::WordVectorEmbeddingProvider;

//! # buddy-advisor
//!
//! Session-level façade over [`buddy_rag`]: keeps each user's index in sync
//! with their finance records and assembles grounded prompts for a
//! language model.
//!
//! ## Overview
//!
//! - [`RagService`] - lazy per-tenant rebuilds, prompt assembly, `ask`
//! - [`RecordSource`], [`BlobStorage`], [`IdentityProvider`] - the external
//!   data the service reads, with in-memory implementations
//! - [`TextGenerator`] - the model that answers an assembled prompt
//! - [`records`] - record types and their one-line summaries
//! - [`telemetry::init_tracing`] - tracing subscriber bootstrap
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use buddy_advisor::{InMemoryBlobStorage, InMemoryRecordSource, RagService, StaticIdentity};
//!
//! let service = RagService::builder()
//!     .engine(Arc::new(engine))
//!     .records(Arc::new(InMemoryRecordSource::new()))
//!     .blobs(Arc::new(InMemoryBlobStorage::new()))
//!     .identity(Arc::new(StaticIdentity::signed_in("u1")))
//!     .build()?;
//!
//! println!("{}", service.build_prompt_for_current_user("How is my budget?", None).await?);
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod records;
pub mod service;
pub mod source;
pub mod telemetry;

pub use config::{AdvisorConfig, AdvisorConfigBuilder};
pub use error::{AdvisorError, Result};
pub use generation::{EchoGenerator, GenerationError, TextGenerator};
pub use prompt::{no_context_prompt, render_prompt};
pub use records::{
    BankTransaction, Expense, FileUpload, Goal, Summarize, SummaryError, TransactionType,
    UserProfile, human_size,
};
pub use service::{
    IndexState, RagService, RagServiceBuilder, RebuildReport, SkippedRecord, WHOLE_COLLECTION,
};
pub use source::{
    BlobStorage, IdentityProvider, InMemoryBlobStorage, InMemoryRecordSource, RecordSource,
    SourceError, StaticIdentity, UserRecords,
};
pub use telemetry::{LogFormat, TelemetryConfig, init_tracing};

//! Session-level orchestration over one [`RagEngine`].
//!
//! [`RagService`] keeps a tenant's index in step with their records and
//! turns questions into grounded prompts. The index is rebuilt lazily: the
//! first query for a tenant (or the first after switching tenants) pulls
//! every collection from the [`RecordSource`], ingests one document per
//! record and prunes documents whose records are gone.
//!
//! Rebuilds are tolerant. A record that cannot be summarised, embedded or
//! stored is skipped and listed in the [`RebuildReport`]; the rest of the
//! rebuild carries on. Ad-hoc ingestion through
//! [`RagService::ingest_statement`] goes straight to the engine and fails
//! as a whole.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use buddy_rag::{Chunk, Document, DocumentSource, IngestOptions, RagEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AdvisorConfig;
use crate::error::{AdvisorError, Result};
use crate::generation::TextGenerator;
use crate::prompt::{no_context_prompt, render_prompt};
use crate::records::{FileUpload, Summarize, UserProfile};
use crate::source::{BlobStorage, IdentityProvider, RecordSource, SourceError};

/// Record id used in a [`SkippedRecord`] when a whole collection failed.
pub const WHOLE_COLLECTION: &str = "*";

/// Freshness of the service's index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexState {
    /// Nothing has been built, or the last rebuild did not finish.
    Empty,
    /// A rebuild for `user_id` is in flight.
    Building { user_id: String },
    /// The index reflects `user_id`'s records as of `built_at`.
    Ready { user_id: String, built_at: DateTime<Utc>, report: Arc<RebuildReport> },
}

impl IndexState {
    /// Whether the index is ready for `user_id`.
    pub fn is_ready_for(&self, user_id: &str) -> bool {
        matches!(self, IndexState::Ready { user_id: ready, .. } if ready == user_id)
    }

    /// Whether a query for `user_id` can skip the rebuild.
    ///
    /// A rebuild that wrote nothing does not count, so records added after a
    /// user's first empty rebuild are picked up by their next query.
    pub fn is_fresh_for(&self, user_id: &str) -> bool {
        match self {
            IndexState::Ready { user_id: ready, report, .. } => {
                ready == user_id && !report.ingested.is_empty()
            }
            _ => false,
        }
    }
}

/// A record left out of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub source: DocumentSource,
    /// The record id, or [`WHOLE_COLLECTION`].
    pub record_id: String,
    pub reason: String,
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub user_id: String,
    /// `(source, doc_id)` of every document written.
    pub ingested: Vec<(DocumentSource, String)>,
    pub skipped: Vec<SkippedRecord>,
    /// Stale documents deleted from the index.
    pub pruned: usize,
}

impl RebuildReport {
    fn new(user_id: &str) -> Self {
        Self { user_id: user_id.to_string(), ..Self::default() }
    }

    /// Human-readable lines describing the rebuild.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.ingested.len() + self.skipped.len() + 2);
        if self.ingested.is_empty() {
            lines.push(format!("No documents indexed for user {}.", self.user_id));
        } else {
            lines.push(format!(
                "Indexed {} documents for user {}.",
                self.ingested.len(),
                self.user_id
            ));
            for (source, doc_id) in &self.ingested {
                lines.push(format!("Ingested {source} document {doc_id}."));
            }
        }
        for skipped in &self.skipped {
            if skipped.record_id == WHOLE_COLLECTION {
                lines.push(format!("Skipped {} collection: {}", skipped.source, skipped.reason));
            } else {
                lines.push(format!(
                    "Skipped {} record {}: {}",
                    skipped.source, skipped.record_id, skipped.reason
                ));
            }
        }
        if self.pruned > 0 {
            lines.push(format!("Pruned {} stale documents.", self.pruned));
        }
        lines
    }
}

/// Bookkeeping for one rebuild pass.
struct RebuildPass {
    report: RebuildReport,
    /// Document ids backed by a record in the source.
    seen: HashSet<String>,
    /// Sources whose collection was fetched, and may therefore be pruned.
    fetched: HashSet<DocumentSource>,
    last_error: Option<SourceError>,
}

impl RebuildPass {
    fn new(user_id: &str) -> Self {
        Self {
            report: RebuildReport::new(user_id),
            seen: HashSet::new(),
            fetched: HashSet::new(),
            last_error: None,
        }
    }

    fn user_id(&self) -> &str {
        &self.report.user_id
    }

    fn skip(
        &mut self,
        source: DocumentSource,
        record_id: impl Into<String>,
        reason: impl Into<String>,
    ) {
        let record_id = record_id.into();
        let reason = reason.into();
        warn!(
            user_id = %self.report.user_id,
            source = %source,
            record_id = %record_id,
            reason = %reason,
            "skipping record"
        );
        self.report.skipped.push(SkippedRecord { source, record_id, reason });
    }

    fn collection_failed(&mut self, source: DocumentSource, err: SourceError) {
        self.skip(source, WHOLE_COLLECTION, err.to_string());
        self.last_error = Some(err);
    }
}

/// Resets `Building` to `Empty` if a rebuild ends without finishing.
struct BuildingGuard<'a> {
    state: &'a Mutex<IndexState>,
    user_id: &'a str,
    finished: bool,
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = lock(self.state);
        if matches!(&*state, IndexState::Building { user_id } if user_id == self.user_id) {
            warn!(user_id = self.user_id, "index rebuild did not complete");
            *state = IndexState::Empty;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a tenant's index fresh and assembles prompts from it.
///
/// # Example
///
/// ```rust,ignore
/// let service = RagService::builder()
///     .engine(engine)
///     .records(records)
///     .blobs(blobs)
///     .identity(identity)
///     .build()?;
///
/// let prompt = service.build_prompt("u1", "Am I on track for my trip?", None).await;
/// ```
pub struct RagService {
    engine: Arc<RagEngine>,
    records: Arc<dyn RecordSource>,
    blobs: Arc<dyn BlobStorage>,
    identity: Arc<dyn IdentityProvider>,
    config: AdvisorConfig,
    state: Mutex<IndexState>,
    rebuild_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for RagService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagService")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("state", &self.index_state())
            .finish_non_exhaustive()
    }
}

impl RagService {
    /// Create a new builder for constructing a [`RagService`].
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Returns a reference to the underlying engine.
    pub fn engine(&self) -> &Arc<RagEngine> {
        &self.engine
    }

    /// Returns a reference to the service configuration.
    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// A snapshot of the index state.
    pub fn index_state(&self) -> IndexState {
        lock(&self.state).clone()
    }

    fn is_fresh_for(&self, user_id: &str) -> bool {
        lock(&self.state).is_fresh_for(user_id)
    }

    /// Entries nobody holds or waits on are dropped, so the map stays as
    /// small as the number of tenants rebuilding at once.
    fn tenant_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock(&self.rebuild_locks);
        locks.retain(|id, held| id == user_id || Arc::strong_count(held) > 1);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    fn current_user(&self) -> Result<String> {
        self.identity.current_user_id().ok_or(AdvisorError::NotAuthenticated)
    }

    /// Rebuild the index for `user_id` unless it is already ready and the
    /// last rebuild wrote at least one document.
    ///
    /// A caller that finds a rebuild in flight waits for it and does not
    /// start another.
    pub async fn ensure_fresh(&self, user_id: &str) -> Result<()> {
        if self.is_fresh_for(user_id) {
            return Ok(());
        }
        let tenant_lock = self.tenant_lock(user_id);
        let _held = tenant_lock.lock().await;
        if self.is_fresh_for(user_id) {
            debug!(user_id, "index was rebuilt by a concurrent caller");
            return Ok(());
        }
        self.rebuild_locked(user_id).await.map(|_| ())
    }

    /// Force a rebuild of `user_id`'s index.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Source`] when no collection could be
    /// fetched. Per-record failures are reported, not returned.
    pub async fn refresh_index(&self, user_id: &str) -> Result<Arc<RebuildReport>> {
        let tenant_lock = self.tenant_lock(user_id);
        let _held = tenant_lock.lock().await;
        self.rebuild_locked(user_id).await
    }

    /// Remove everything indexed for `user_id`.
    pub async fn clear_index(&self, user_id: &str) -> Result<usize> {
        let tenant_lock = self.tenant_lock(user_id);
        let _held = tenant_lock.lock().await;
        let removed = self.engine.clear_user(user_id).await?;
        let mut state = lock(&self.state);
        if state.is_ready_for(user_id) {
            *state = IndexState::Empty;
        }
        Ok(removed)
    }

    /// Must be called with the tenant lock held.
    async fn rebuild_locked(&self, user_id: &str) -> Result<Arc<RebuildReport>> {
        *lock(&self.state) = IndexState::Building { user_id: user_id.to_string() };
        let mut guard = BuildingGuard { state: &self.state, user_id, finished: false };

        let started = Instant::now();
        let report = Arc::new(self.rebuild(user_id).await?);
        guard.finished = true;

        *lock(&self.state) = IndexState::Ready {
            user_id: user_id.to_string(),
            built_at: Utc::now(),
            report: Arc::clone(&report),
        };
        info!(
            user_id,
            ingested = report.ingested.len(),
            skipped = report.skipped.len(),
            pruned = report.pruned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuild completed"
        );
        Ok(report)
    }

    async fn rebuild(&self, user_id: &str) -> Result<RebuildReport> {
        let mut pass = RebuildPass::new(user_id);

        match self.records.expenses(user_id).await {
            Ok(expenses) => {
                pass.fetched.insert(DocumentSource::Expenses);
                for expense in &expenses {
                    self.ingest_record(&mut pass, expense).await;
                }
            }
            Err(e) => pass.collection_failed(DocumentSource::Expenses, e),
        }

        match self.records.transactions(user_id).await {
            Ok(transactions) => {
                pass.fetched.insert(DocumentSource::Transactions);
                for transaction in &transactions {
                    self.ingest_record(&mut pass, transaction).await;
                }
            }
            Err(e) => pass.collection_failed(DocumentSource::Transactions, e),
        }

        match self.records.goals(user_id).await {
            Ok(goals) => {
                pass.fetched.insert(DocumentSource::Goals);
                for goal in &goals {
                    self.ingest_record(&mut pass, goal).await;
                }
            }
            Err(e) => pass.collection_failed(DocumentSource::Goals, e),
        }

        match self.records.profile(user_id).await {
            Ok(profile) => {
                pass.fetched.insert(DocumentSource::Profile);
                match profile {
                    Some(profile) => self.ingest_profile(&mut pass, &profile).await,
                    None => debug!(user_id, "user has no profile"),
                }
            }
            Err(e) => pass.collection_failed(DocumentSource::Profile, e),
        }

        match self.records.uploads(user_id).await {
            Ok(uploads) => {
                pass.fetched.insert(DocumentSource::UploadsMetadata);
                pass.fetched.insert(DocumentSource::UploadsContent);
                for upload in &uploads {
                    self.ingest_record(&mut pass, upload).await;
                    if self.config.is_text_mime(&upload.file_type) {
                        self.ingest_upload_content(&mut pass, upload).await;
                    }
                }
            }
            Err(e) => pass.collection_failed(DocumentSource::UploadsMetadata, e),
        }

        if pass.fetched.is_empty() {
            if let Some(err) = pass.last_error.take() {
                error!(user_id, error = %err, "no collection could be fetched");
                return Err(err.into());
            }
        }

        self.prune(&mut pass).await;
        Ok(pass.report)
    }

    async fn ingest_record<R: Summarize + Sync>(&self, pass: &mut RebuildPass, record: &R) {
        let doc_id = record.record_id().to_string();
        pass.seen.insert(doc_id.clone());
        match record.summary() {
            Ok(text) => {
                let document = Document::with_id(doc_id, pass.user_id(), text, R::SOURCE);
                self.ingest_document(pass, document, &IngestOptions::default()).await;
            }
            Err(e) => pass.skip(R::SOURCE, doc_id, e.reason),
        }
    }

    async fn ingest_profile(&self, pass: &mut RebuildPass, profile: &UserProfile) {
        let doc_id = UserProfile::document_id(pass.user_id());
        pass.seen.insert(doc_id.clone());
        match profile.summary(pass.user_id()) {
            Ok(text) => {
                let document =
                    Document::with_id(doc_id, pass.user_id(), text, DocumentSource::Profile);
                self.ingest_document(pass, document, &IngestOptions::default()).await;
            }
            Err(e) => pass.skip(DocumentSource::Profile, doc_id, e.reason),
        }
    }

    async fn ingest_upload_content(&self, pass: &mut RebuildPass, upload: &FileUpload) {
        let doc_id = upload.content_document_id();
        let bytes =
            match self.blobs.download(&upload.storage_path, self.config.max_upload_bytes).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    pass.seen.insert(doc_id.clone());
                    pass.skip(DocumentSource::UploadsContent, doc_id, e.to_string());
                    return;
                }
            };
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                pass.seen.insert(doc_id.clone());
                pass.skip(
                    DocumentSource::UploadsContent,
                    doc_id,
                    format!("content is not valid UTF-8: {e}"),
                );
                return;
            }
        };
        // Empty content leaves nothing to keep, so any old chunks get pruned.
        if text.trim().is_empty() {
            pass.skip(DocumentSource::UploadsContent, doc_id, "content is empty");
            return;
        }

        pass.seen.insert(doc_id.clone());
        let options = IngestOptions::default()
            .max_chars(self.engine.config().upload_chunk_chars)
            .chunk_prefix(upload.content_prefix());
        let document =
            Document::with_id(doc_id, pass.user_id(), text, DocumentSource::UploadsContent);
        self.ingest_document(pass, document, &options).await;
    }

    async fn ingest_document(
        &self,
        pass: &mut RebuildPass,
        document: Document,
        options: &IngestOptions,
    ) {
        match self.engine.ingest_with(pass.user_id(), &document, options).await {
            Ok(chunks) => {
                debug!(
                    user_id = pass.user_id(),
                    doc_id = %document.id,
                    chunk_count = chunks.len(),
                    "document indexed"
                );
                pass.report.ingested.push((document.source, document.id));
            }
            Err(e) => pass.skip(document.source, document.id, e.to_string()),
        }
    }

    /// Delete indexed documents of a fetched source that no record backs.
    async fn prune(&self, pass: &mut RebuildPass) {
        let store = self.engine.vector_store();
        let owner = pass.report.user_id.clone();
        let user_id = owner.as_str();
        let indexed = match store.document_sources(user_id).await {
            Ok(indexed) => indexed,
            Err(e) => {
                warn!(user_id, error = %e, "cannot list indexed documents, skipping prune");
                return;
            }
        };

        for (doc_id, source) in indexed {
            if pass.seen.contains(&doc_id) || !pass.fetched.contains(&source) {
                continue;
            }
            match store.delete_document(user_id, &doc_id).await {
                Ok(removed) => {
                    debug!(user_id, doc_id = %doc_id, removed, "pruned stale document");
                    pass.report.pruned += 1;
                }
                Err(e) => {
                    warn!(user_id, doc_id = %doc_id, error = %e, "failed to prune stale document")
                }
            }
        }
    }

    /// Assemble the prompt for `question` from `user_id`'s index.
    ///
    /// Never fails: a rebuild or retrieval error yields the context-free
    /// prompt. `top_k` defaults to [`AdvisorConfig::top_k`].
    pub async fn build_prompt(
        &self,
        user_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> String {
        if let Err(e) = self.ensure_fresh(user_id).await {
            warn!(user_id, error = %e, "index unavailable, answering without context");
            return no_context_prompt(question);
        }

        let top_k = top_k.unwrap_or(self.config.top_k);
        match self.engine.retrieve(user_id, question, Some(top_k)).await {
            Ok(hits) => {
                info!(user_id, top_k, hit_count = hits.len(), "prompt assembled");
                render_prompt(question, &hits)
            }
            Err(e) => {
                warn!(user_id, error = %e, "retrieval failed, answering without context");
                no_context_prompt(question)
            }
        }
    }

    /// [`build_prompt`](Self::build_prompt) that stops when `cancel` fires.
    ///
    /// An interrupted rebuild leaves the index [`IndexState::Empty`].
    pub async fn build_prompt_cancellable(
        &self,
        user_id: &str,
        question: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(user_id, "prompt assembly cancelled");
                Err(AdvisorError::Cancelled)
            }
            prompt = self.build_prompt(user_id, question, top_k) => Ok(prompt),
        }
    }

    /// Build the prompt for `question` and hand it to `generator`.
    pub async fn ask(
        &self,
        user_id: &str,
        question: &str,
        generator: &dyn TextGenerator,
    ) -> Result<String> {
        let prompt = self.build_prompt(user_id, question, None).await;
        generator.generate(&prompt).await.map_err(|e| {
            error!(user_id, error = %e, "generation failed");
            AdvisorError::Generation(e.0)
        })
    }

    /// Index a long free-form text, such as a pasted bank statement.
    ///
    /// The document survives rebuilds, since no record source backs it.
    ///
    /// # Errors
    ///
    /// Any embedding or storage error is returned and nothing is written.
    pub async fn ingest_statement(
        &self,
        user_id: &str,
        text: &str,
        source: impl Into<DocumentSource>,
    ) -> Result<Vec<Chunk>> {
        let document = Document::new(user_id, text, source);
        Ok(self.engine.ingest(user_id, &document).await?)
    }

    /// [`refresh_index`](Self::refresh_index) for the signed-in user.
    pub async fn refresh_index_for_current_user(&self) -> Result<Arc<RebuildReport>> {
        let user_id = self.current_user()?;
        self.refresh_index(&user_id).await
    }

    /// [`build_prompt`](Self::build_prompt) for the signed-in user.
    pub async fn build_prompt_for_current_user(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<String> {
        let user_id = self.current_user()?;
        Ok(self.build_prompt(&user_id, question, top_k).await)
    }

    /// [`ask`](Self::ask) for the signed-in user.
    pub async fn ask_for_current_user(
        &self,
        question: &str,
        generator: &dyn TextGenerator,
    ) -> Result<String> {
        let user_id = self.current_user()?;
        self.ask(&user_id, question, generator).await
    }
}

/// Builder for constructing a [`RagService`].
#[derive(Default)]
pub struct RagServiceBuilder {
    engine: Option<Arc<RagEngine>>,
    records: Option<Arc<dyn RecordSource>>,
    blobs: Option<Arc<dyn BlobStorage>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    config: Option<AdvisorConfig>,
}

impl RagServiceBuilder {
    /// Set the retrieval engine.
    pub fn engine(mut self, engine: Arc<RagEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the record source.
    pub fn records(mut self, records: Arc<dyn RecordSource>) -> Self {
        self.records = Some(records);
        self
    }

    /// Set the blob storage used for upload content.
    pub fn blobs(mut self, blobs: Arc<dyn BlobStorage>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Set the identity provider.
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the service configuration. Defaults to [`AdvisorConfig::default`].
    pub fn config(mut self, config: AdvisorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the [`RagService`].
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Config`] if a collaborator is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagService> {
        let engine = self.engine.ok_or_else(|| missing("engine"))?;
        let records = self.records.ok_or_else(|| missing("records"))?;
        let blobs = self.blobs.ok_or_else(|| missing("blobs"))?;
        let identity = self.identity.ok_or_else(|| missing("identity"))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(RagService {
            engine,
            records,
            blobs,
            identity,
            config,
            state: Mutex::new(IndexState::Empty),
            rebuild_locks: Mutex::new(HashMap::new()),
        })
    }
}

fn missing(field: &str) -> AdvisorError {
    AdvisorError::Config(format!("{field} is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_summary_lines() {
        let report = RebuildReport {
            user_id: "u1".into(),
            ingested: vec![(DocumentSource::Goals, "g1".into())],
            skipped: vec![
                SkippedRecord {
                    source: DocumentSource::Expenses,
                    record_id: "e9".into(),
                    reason: "category is empty".into(),
                },
                SkippedRecord {
                    source: DocumentSource::Transactions,
                    record_id: WHOLE_COLLECTION.into(),
                    reason: "source unavailable: down".into(),
                },
            ],
            pruned: 2,
        };
        assert_eq!(
            report.summary(),
            vec![
                "Indexed 1 documents for user u1.",
                "Ingested goals document g1.",
                "Skipped expenses record e9: category is empty",
                "Skipped transactions collection: source unavailable: down",
                "Pruned 2 stale documents.",
            ]
        );
        assert_eq!(RebuildReport::new("u2").summary(), vec!["No documents indexed for user u2."]);
    }

    #[test]
    fn ready_state_is_per_tenant() {
        let state = IndexState::Ready {
            user_id: "u1".into(),
            built_at: Utc::now(),
            report: Arc::new(RebuildReport::new("u1")),
        };
        assert!(state.is_ready_for("u1"));
        assert!(!state.is_ready_for("u2"));
        assert!(!IndexState::Building { user_id: "u1".into() }.is_ready_for("u1"));
    }

    #[test]
    fn empty_rebuild_is_ready_but_not_fresh() {
        let ready = |report: RebuildReport| IndexState::Ready {
            user_id: "u1".into(),
            built_at: Utc::now(),
            report: Arc::new(report),
        };
        let empty = ready(RebuildReport::new("u1"));
        assert!(empty.is_ready_for("u1"));
        assert!(!empty.is_fresh_for("u1"));

        let mut report = RebuildReport::new("u1");
        report.ingested.push((DocumentSource::Goals, "g1".into()));
        let built = ready(report);
        assert!(built.is_fresh_for("u1"));
        assert!(!built.is_fresh_for("u2"));
    }

    #[tokio::test]
    async fn idle_tenant_locks_are_released() {
        use buddy_rag::{InMemoryVectorStore, RagEngine, WordVectorEmbeddingProvider};

        use crate::source::{InMemoryBlobStorage, InMemoryRecordSource, StaticIdentity};

        let provider =
            WordVectorEmbeddingProvider::from_reader("goal 1.0 0.0\n".as_bytes()).unwrap();
        let engine = RagEngine::builder()
            .embedding_provider(Arc::new(provider))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap();
        let service = RagService::builder()
            .engine(Arc::new(engine))
            .records(Arc::new(InMemoryRecordSource::new()))
            .blobs(Arc::new(InMemoryBlobStorage::new()))
            .identity(Arc::new(StaticIdentity::signed_out()))
            .build()
            .unwrap();

        for n in 0..50 {
            service.refresh_index(&format!("u{n}")).await.unwrap();
        }
        assert!(lock(&service.rebuild_locks).len() <= 1);

        let held = service.tenant_lock("busy");
        let _guard = held.lock().await;
        service.refresh_index("other").await.unwrap();
        assert!(lock(&service.rebuild_locks).contains_key("busy"));
    }
}

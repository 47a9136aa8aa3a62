//! Boundaries to the external per-user data: records, file blobs and identity.
//!
//! The remote document store, blob storage and authentication are outside
//! this crate. Each is reached through a small async trait so the service
//! can be wired to a real backend or to the in-memory doubles below.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::records::{BankTransaction, Expense, FileUpload, Goal, UserProfile};

/// Errors from a [`RecordSource`] or [`BlobStorage`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The backend could not be reached or refused the request.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object is larger than the caller allowed.
    #[error("'{path}' is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Storage path of the object.
        path: String,
        /// Actual size in bytes.
        size: usize,
        /// The caller's limit in bytes.
        limit: usize,
    },

    /// A stored record could not be decoded.
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Read access to one user's records in the remote store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Spending records.
    async fn expenses(&self, user_id: &str) -> Result<Vec<Expense>, SourceError>;

    /// Income records.
    async fn transactions(&self, user_id: &str) -> Result<Vec<BankTransaction>, SourceError>;

    /// Savings goals.
    async fn goals(&self, user_id: &str) -> Result<Vec<Goal>, SourceError>;

    /// The profile singleton, if the user has one.
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, SourceError>;

    /// Metadata of uploaded files.
    async fn uploads(&self, user_id: &str) -> Result<Vec<FileUpload>, SourceError>;
}

/// Read access to uploaded file content.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Download the object at `path`, failing if it exceeds `max_bytes`.
    async fn download(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, SourceError>;
}

/// Resolves the signed-in user.
pub trait IdentityProvider: Send + Sync {
    /// The current user's id, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;
}

/// One user's records held by [`InMemoryRecordSource`].
#[derive(Debug, Clone, Default)]
pub struct UserRecords {
    pub expenses: Vec<Expense>,
    pub transactions: Vec<BankTransaction>,
    pub goals: Vec<Goal>,
    pub profile: Option<UserProfile>,
    pub uploads: Vec<FileUpload>,
}

// A panic inside `update_user` leaves the map itself intact.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A [`RecordSource`] over in-process data, for tests and demos.
///
/// Collections can be marked as failing to exercise partial rebuilds.
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    users: RwLock<HashMap<String, UserRecords>>,
    failing: RwLock<Vec<&'static str>>,
}

impl InMemoryRecordSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every record of `user_id`.
    pub fn set_user(&self, user_id: impl Into<String>, records: UserRecords) {
        write_lock(&self.users).insert(user_id.into(), records);
    }

    /// Apply `f` to the records of `user_id`, creating them if needed.
    pub fn update_user(&self, user_id: &str, f: impl FnOnce(&mut UserRecords)) {
        f(write_lock(&self.users).entry(user_id.to_string()).or_default());
    }

    /// Make every fetch of `collection` (`"expenses"`, `"goals"`, ...) fail.
    pub fn fail_collection(&self, collection: &'static str) {
        write_lock(&self.failing).push(collection);
    }

    fn read<T>(
        &self,
        collection: &'static str,
        user_id: &str,
        f: impl FnOnce(&UserRecords) -> T,
    ) -> Result<T, SourceError> {
        if read_lock(&self.failing).contains(&collection) {
            return Err(SourceError::Unavailable(format!("{collection} is unavailable")));
        }
        let users = read_lock(&self.users);
        let empty = UserRecords::default();
        Ok(f(users.get(user_id).unwrap_or(&empty)))
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn expenses(&self, user_id: &str) -> Result<Vec<Expense>, SourceError> {
        self.read("expenses", user_id, |r| r.expenses.clone())
    }

    async fn transactions(&self, user_id: &str) -> Result<Vec<BankTransaction>, SourceError> {
        self.read("transactions", user_id, |r| r.transactions.clone())
    }

    async fn goals(&self, user_id: &str) -> Result<Vec<Goal>, SourceError> {
        self.read("goals", user_id, |r| r.goals.clone())
    }

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, SourceError> {
        self.read("profile", user_id, |r| r.profile.clone())
    }

    async fn uploads(&self, user_id: &str) -> Result<Vec<FileUpload>, SourceError> {
        self.read("uploads", user_id, |r| r.uploads.clone())
    }
}

/// A [`BlobStorage`] over in-process byte buffers.
#[derive(Debug, Default)]
pub struct InMemoryBlobStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` at `path`.
    pub fn put(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        write_lock(&self.blobs).insert(path.into(), bytes.into());
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn download(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, SourceError> {
        let blobs = read_lock(&self.blobs);
        let bytes = blobs.get(path).ok_or_else(|| SourceError::NotFound(path.to_string()))?;
        if bytes.len() > max_bytes {
            return Err(SourceError::TooLarge {
                path: path.to_string(),
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(bytes.clone())
    }
}

/// An [`IdentityProvider`] with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    /// Always report `user_id` as signed in.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()) }
    }

    /// Always report no user.
    pub fn signed_out() -> Self {
        Self { user_id: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

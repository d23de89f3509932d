//! Backend abstraction for document store drivers.
//!
//! This module defines the [`Backend`] trait, which hands out collection
//! sessions, and the [`CollectionSession`] trait, the narrow set of native
//! operations the storage engine needs from a store: batch insert, replace
//! and remove by filter, bulk remove, cursor-based find and count.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use futures_util::stream::BoxStream;

use crate::context::OperationContext;
use crate::error::BackendError;
use crate::translate::FindSpec;

/// Identifies the type of document store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process store, used for tests and embedding.
    Memory,
    /// MongoDB (document store).
    MongoDB,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::MongoDB => write!(f, "mongodb"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Result of a single-document replace or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A document matched the filter and was written.
    Matched,
    /// No document matched the filter.
    NotMatched,
}

impl WriteOutcome {
    /// Builds an outcome from a matched document count.
    pub fn from_count(matched: u64) -> Self {
        if matched > 0 {
            WriteOutcome::Matched
        } else {
            WriteOutcome::NotMatched
        }
    }
}

/// Stream of documents returned by a find.
pub type DocumentCursor = BoxStream<'static, Result<Document, BackendError>>;

/// Native operations on one collection.
///
/// A session is acquired per storage operation and handed back through
/// [`Backend::release`] once the operation completes.
#[async_trait]
pub trait CollectionSession: Send + Sync {
    /// Returns the name of the collection the session operates on.
    fn collection_name(&self) -> &str;

    /// Inserts documents in order, stopping at the first failure.
    ///
    /// A document whose `_id` is already stored fails with
    /// [`BackendError::DuplicateKey`]; documents before it stay inserted.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), BackendError>;

    /// Replaces the first document matching `filter`.
    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
    ) -> Result<WriteOutcome, BackendError>;

    /// Removes the first document matching `filter`.
    async fn delete_one(&self, filter: Document) -> Result<WriteOutcome, BackendError>;

    /// Removes every document matching `filter` and returns how many were removed.
    async fn delete_many(&self, filter: Document) -> Result<u64, BackendError>;

    /// Opens a cursor over documents matching `filter`.
    async fn find(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> Result<DocumentCursor, BackendError>;

    /// Counts documents matching `filter`.
    async fn count(
        &self,
        filter: Document,
        max_time: Option<Duration>,
    ) -> Result<u64, BackendError>;
}

/// A document store backend.
///
/// # Example
///
/// ```
/// use resource_persistence::backends::memory::MemoryBackend;
/// use resource_persistence::core::{Backend, BackendKind};
///
/// let backend = MemoryBackend::new("items");
/// assert_eq!(backend.kind(), BackendKind::Memory);
/// assert_eq!(backend.name(), "memory");
/// ```
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// The session type used by this backend.
    type Session: CollectionSession;

    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Acquires a session for the collection, bounded by `ctx`.
    async fn acquire(&self, ctx: &OperationContext) -> Result<Self::Session, BackendError>;

    /// Returns the session back to the backend.
    async fn release(&self, session: Self::Session);

    /// Checks if the backend is healthy and accepting requests.
    async fn health_check(&self) -> Result<(), BackendError>;
}

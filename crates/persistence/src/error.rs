//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates item state errors, concurrency errors,
//! query translation errors, context expiry and backend failures.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
///
/// This enum encompasses all possible errors that can occur during persistence
/// operations, organized by category. Backend failures keep the driver's own
/// error as their source so callers can tell infrastructure failures apart
/// from domain failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Item state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Concurrency and versioning errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Query translation errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Cancellation and deadline errors
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Field validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` if the target item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }

    /// Returns `true` for version mismatches and duplicate identifiers.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Concurrency(_))
    }

    /// Returns `true` if the query contained an expression the translator cannot map.
    pub fn is_unsupported_expression(&self) -> bool {
        matches!(
            self,
            StorageError::Query(QueryError::UnsupportedExpression { .. })
        )
    }

    /// Returns `true` if the operation context was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Context(_))
    }
}

/// Errors related to item state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested item was not found.
    #[error("item not found: {id}")]
    NotFound { id: String },
}

/// Errors related to concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The stored version of the item does not match the expected one.
    #[error("version conflict on item {id}: expected etag {expected_etag}")]
    VersionConflict { id: String, expected_etag: String },

    /// An item with the same identifier already exists.
    #[error("duplicate key: {message}")]
    DuplicateKey { message: String },
}

/// Errors raised while translating a query into the store's native form.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The predicate contains an expression kind with no native mapping.
    #[error("unsupported expression: {kind}")]
    UnsupportedExpression { kind: String },

    /// The query window carries an offset or limit outside the accepted range.
    #[error("invalid window: {message}")]
    InvalidWindow { message: String },
}

/// Errors raised when the operation context expires.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation deadline passed before the store answered.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Errors related to field validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The value is not a valid object identifier.
    #[error("invalid object id: {message}")]
    InvalidObjectId { message: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The store rejected a write because the primary key already exists.
    #[error("duplicate key in {backend_name}: {message}")]
    DuplicateKey {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(feature = "mongodb")]
const MONGO_DUPLICATE_KEY: i32 = 11000;

#[cfg(feature = "mongodb")]
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == MONGO_DUPLICATE_KEY,
        ErrorKind::InsertMany(e) => e
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == MONGO_DUPLICATE_KEY)),
        ErrorKind::Command(e) => e.code == MONGO_DUPLICATE_KEY,
        _ => false,
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for BackendError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return BackendError::DuplicateKey {
                backend_name: "mongodb".to_string(),
                message: err.to_string(),
            };
        }
        BackendError::Internal {
            backend_name: "mongodb".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Backend(err.into())
    }
}

//! In-memory backend implementation.
//!
//! Keeps one collection of BSON documents in process and evaluates the
//! same filter, sort, and projection documents the MongoDB backend sends to
//! the server. It is the backend used by the test suite and is a good fit
//! for development without a running database.
//!
//! # Supported filter operators
//!
//! `$and`, `$or`, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
//! `$exists`, `$regex` (with `$options`), `$elemMatch`.
//!
//! # Example
//!
//! ```
//! use resource_persistence::backends::memory::MemoryBackend;
//! use resource_persistence::CollectionStorage;
//!
//! let backend = MemoryBackend::new("users");
//! let storage = CollectionStorage::new(backend.clone());
//!
//! assert!(backend.is_empty());
//! # let _ = storage;
//! ```

mod backend;
mod matcher;

pub use backend::{MemoryBackend, MemorySession};

//! Core storage traits and abstractions.
//!
//! This module provides the foundational traits for the persistence layer:
//!
//! - [`Backend`] - Document store driver abstraction
//! - [`CollectionSession`] - Native operations on one collection
//! - [`ResourceStorage`] - Item operations with optimistic concurrency
//!
//! # Layering
//!
//! ```text
//! ResourceStorage            (items, queries, etags)
//!     └── CollectionStorage  (translation, CAS disambiguation, count deduction)
//!             └── Backend / CollectionSession  (native documents and filters)
//! ```

pub mod backend;
pub mod storage;

// Re-export main types
pub use backend::{Backend, BackendKind, CollectionSession, DocumentCursor, WriteOutcome};
pub use storage::{ClearOutcome, ResourceStorage};

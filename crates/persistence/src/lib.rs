//! Resource Persistence Layer over Document Stores
//!
//! This crate stores opaque resource items in a single collection of a
//! document store. It translates structured queries into native filter
//! documents and guards writes with optimistic concurrency on an entity tag.
//!
//! # Features
//!
//! - **Query Translation**: Predicates, sort keys, and windows into native filter and find options
//! - **Optimistic Concurrency**: Compare-and-swap on `_etag`, with not-found vs. conflict disambiguation
//! - **Total Deduction**: Result totals inferred from short pages, never overstated
//! - **Cancellation**: Every operation is bounded by an [`OperationContext`] deadline or cancel signal
//!
//! # Backend Features
//!
//! The in-memory backend is always available. Enable the MongoDB backend with:
//!
//! ```toml
//! [dependencies]
//! resource-persistence = { version = "0.1", features = ["mongodb"] }
//! ```
//!
//! # Architecture
//!
//! - [`types`] - Items, entity tags, predicates, and queries
//! - [`translate`] - Predicate and sort translation into native documents
//! - [`codec`] - Item to stored document conversion
//! - [`engine`] - [`CollectionStorage`], the CRUD engine
//! - [`core`] - Storage and backend traits
//! - [`context`] - Deadlines and cancellation
//! - [`backends`] - Backend implementations (memory, MongoDB)
//! - [`config`] - Backend configuration
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use bson::doc;
//! use resource_persistence::backends::memory::MemoryBackend;
//! use resource_persistence::core::ResourceStorage;
//! use resource_persistence::types::{ETag, Expression, Item, Query, SortField, Window};
//! use resource_persistence::{CollectionStorage, OperationContext};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = CollectionStorage::new(MemoryBackend::new("users"));
//! let ctx = OperationContext::new();
//!
//! let alice = Item::new("alice", doc! { "name": "Alice", "age": 31 })
//!     .with_etag(ETag::explicit("v1"));
//! storage.insert(&ctx, &[alice]).await?;
//!
//! let query = Query::new()
//!     .with_predicate(Expression::greater_or_equal("age", 18))
//!     .with_sort(SortField::asc("name"))
//!     .with_window(Window::new(0, Some(10)));
//! let list = storage.find(&ctx, &query).await?;
//!
//! assert_eq!(list.items.len(), 1);
//! assert_eq!(list.total, Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Updates and deletes carry the entity tag the caller last read. A write
//! against a stale tag fails with a conflict, a write against a missing item
//! fails with not found:
//!
//! ```
//! use bson::doc;
//! use resource_persistence::backends::memory::MemoryBackend;
//! use resource_persistence::core::ResourceStorage;
//! use resource_persistence::types::{ETag, Item};
//! use resource_persistence::{CollectionStorage, OperationContext};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let storage = CollectionStorage::new(MemoryBackend::new("users"));
//! let ctx = OperationContext::new();
//!
//! let v1 = Item::new("bob", doc! { "name": "Bob" }).with_etag(ETag::explicit("v1"));
//! storage.insert(&ctx, &[v1.clone()]).await.unwrap();
//!
//! let v2 = v1.clone().with_etag(ETag::explicit("v2"));
//! storage.update(&ctx, &v2, &v1).await.unwrap();
//!
//! // v1 is now stale
//! let err = storage.delete(&ctx, &v1).await.unwrap_err();
//! assert!(err.is_conflict());
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod codec;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod error;
pub mod translate;
pub mod types;

// Re-export commonly used types at crate root
pub use context::{CancelHandle, OperationContext};
pub use engine::CollectionStorage;
pub use error::{StorageError, StorageResult};
pub use types::{ETag, Item, ItemId, ItemList, Query};

// Re-export core traits
pub use core::{Backend, BackendKind, ClearOutcome, CollectionSession, ResourceStorage};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

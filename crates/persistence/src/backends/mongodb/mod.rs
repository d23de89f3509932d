//! MongoDB backend implementation.
//!
//! Wraps one collection of the official driver. Filters, sort documents,
//! and projections produced by [`translate`](crate::translate) are sent as
//! they are; the server evaluates them.
//!
//! # Example
//!
//! ```no_run
//! use resource_persistence::backends::mongodb::connect_mongo;
//! use resource_persistence::config::MongoConfig;
//! use resource_persistence::core::ResourceStorage;
//! use resource_persistence::types::Query;
//! use resource_persistence::OperationContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = connect_mongo(MongoConfig::new("mongodb://localhost:27017", "app", "users")).await?;
//!
//! let total = storage.count(&OperationContext::new(), &Query::new()).await?;
//! println!("{} users", total);
//! # Ok(())
//! # }
//! ```
//!
//! # Stored documents
//!
//! ```text
//! { "_id": <item id>, "_etag": "<token>", "_updated": ISODate(...), <payload fields> }
//! ```
//!
//! With a nested layout the payload fields live under the configured prefix
//! instead of the document root.

mod backend;

pub use backend::{MongoBackend, MongoSession, connect_mongo};

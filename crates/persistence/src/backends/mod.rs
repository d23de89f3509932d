//! Document store backend implementations.
//!
//! Each backend implements [`Backend`](crate::core::Backend) and speaks the
//! native filter documents produced by [`translate`](crate::translate).
//! Backends other than the in-memory one are gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (always) | In-process collection, used for tests and development |
//! | MongoDB | `mongodb` | MongoDB server through the official driver |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "mongodb")]
//! use resource_persistence::backends::mongodb::connect_mongo;
//! # #[cfg(feature = "mongodb")]
//! use resource_persistence::config::MongoConfig;
//!
//! # #[cfg(feature = "mongodb")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = connect_mongo(MongoConfig::new("mongodb://localhost:27017", "app", "users")).await?;
//! # let _ = storage;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;

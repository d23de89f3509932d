//! Core types for the persistence layer.
//!
//! This module provides the fundamental types used throughout the persistence layer:
//!
//! - [`Item`], [`ItemId`], [`ETag`] - A stored item with its identity and version
//! - [`ItemList`] - A page of items returned by find
//! - [`Query`], [`Predicate`], [`Expression`] - The filter/sort/window query model
//! - [`ObjectIdField`] - Validation for object id identifiers
//!
//! # Examples
//!
//! ## Creating an Item
//!
//! ```
//! use bson::doc;
//! use resource_persistence::types::{ETag, Item};
//!
//! let item = Item::new("1234", doc! { "name": "Smith" }).with_etag(ETag::explicit("v1"));
//! assert_eq!(item.payload().get_str("id").unwrap(), "1234");
//! ```
//!
//! ## Building a Query
//!
//! ```
//! use resource_persistence::types::{Expression, Query, SortField, Window};
//!
//! let query = Query::new()
//!     .with_predicate(Expression::or([
//!         Expression::equal("status", "active"),
//!         Expression::greater_than("age", 18),
//!     ]))
//!     .with_sort(SortField::parse("-age"))
//!     .with_window(Window::new(0, Some(20)));
//! ```

mod item;
mod object_id;
mod query;

pub use item::{ETag, Item, ItemId, ItemList, PAYLOAD_ID_KEY, PROVISIONAL_ETAG_PREFIX};
pub use object_id::{ObjectIdField, new_object_id};
pub use query::{Expression, Operand, Predicate, Query, SortField, Window};

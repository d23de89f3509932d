//! Query translation into native store documents.
//!
//! - [`translate_predicate`] - predicate into filter document
//! - [`translate_sort`] and [`apply_window`] - sort keys and window into [`FindSpec`]
//! - [`FieldMapper`] - logical field names into stored keys, per [`DocumentLayout`]
//!
//! Translation is pure and happens before any round-trip, so an
//! untranslatable query never reaches the store.

mod field;
mod predicate;
mod sort;

pub use field::{
    DocumentLayout, ETAG_FIELD, FieldMapper, ID_FIELD, LOGICAL_ID_FIELD, UPDATED_FIELD,
};
pub use predicate::translate_predicate;
pub use sort::{FindSpec, apply_window, translate_sort};

//! Sort and window translation into cursor options.

use std::time::Duration;

use bson::{Document, doc};

use crate::types::{SortField, Window};

use super::field::{FieldMapper, ID_FIELD};

/// Translates sort keys into a native sort document.
///
/// Reversed keys sort descending. Without any key the result is sorted by
/// primary key so that windows are stable across calls. A key repeated later
/// in the list is ignored, the first occurrence being the most significant.
pub fn translate_sort(sort: &[SortField], fields: &FieldMapper) -> Document {
    if sort.is_empty() {
        return doc! { ID_FIELD: 1 };
    }
    let mut spec = Document::new();
    for field in sort {
        let key = fields.map(&field.name);
        if spec.contains_key(key.as_ref()) {
            continue;
        }
        spec.insert(key.into_owned(), if field.reversed { -1 } else { 1 });
    }
    spec
}

/// Options of a find round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Native sort document.
    pub sort: Document,
    /// Number of documents to skip.
    pub skip: u64,
    /// Maximum number of documents; `None` is unbounded.
    ///
    /// Never `Some(0)`: stores read a zero limit as unbounded.
    pub limit: Option<u64>,
    /// Fields to return, all of them when `None`.
    pub projection: Option<Document>,
    /// Server-side time budget.
    pub max_time: Option<Duration>,
}

impl FindSpec {
    /// Creates options sorted by `sort`.
    pub fn new(sort: Document) -> Self {
        Self {
            sort,
            ..Default::default()
        }
    }

    /// Restricts the returned fields.
    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Sets the server-side time budget.
    pub fn with_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }
}

/// Applies a window to find options.
///
/// The offset becomes a skip when positive and a bounded limit becomes a
/// limit. Callers handle `limit = 0` themselves before reaching the store.
pub fn apply_window(mut spec: FindSpec, window: &Window) -> FindSpec {
    if window.offset > 0 {
        spec.skip = window.offset;
    }
    if let Some(limit) = window.limit {
        debug_assert!(limit > 0, "zero limits never reach the store");
        spec.limit = Some(limit);
    }
    spec
}

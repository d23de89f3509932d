//! Field name mapping between logical names and stored document keys.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Stored key of the primary identifier.
pub const ID_FIELD: &str = "_id";

/// Stored key of the explicit version token.
pub const ETAG_FIELD: &str = "_etag";

/// Stored key of the last modification time.
pub const UPDATED_FIELD: &str = "_updated";

/// Logical name of the identifier field.
pub const LOGICAL_ID_FIELD: &str = "id";

/// How payload fields are laid out in the stored document.
///
/// The bookkeeping keys (`_id`, `_etag`, `_updated`) are always top-level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentLayout {
    /// Payload fields sit next to the bookkeeping keys.
    #[default]
    Inline,
    /// Payload fields live in a sub-document under `prefix`.
    Nested {
        /// Key of the payload sub-document.
        prefix: String,
    },
}

impl DocumentLayout {
    /// Nested layout under `prefix`.
    pub fn nested(prefix: impl Into<String>) -> Self {
        DocumentLayout::Nested {
            prefix: prefix.into(),
        }
    }

    /// Returns the payload prefix, if nested.
    pub fn prefix(&self) -> Option<&str> {
        match self {
            DocumentLayout::Inline => None,
            DocumentLayout::Nested { prefix } => Some(prefix),
        }
    }
}

/// Rewrites logical field names into stored keys.
///
/// `id` always maps to `_id`. In the nested layout every other field is
/// prefixed with the payload key.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    layout: DocumentLayout,
}

impl FieldMapper {
    /// Creates a mapper for `layout`.
    pub fn new(layout: DocumentLayout) -> Self {
        Self { layout }
    }

    /// Mapper for fields of array elements matched by `$elemMatch`.
    ///
    /// Element fields are relative to the element, so no prefix applies.
    pub fn element() -> Self {
        Self::default()
    }

    /// Returns the layout.
    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    /// Maps a logical field name to its stored key.
    pub fn map<'a>(&self, field: &'a str) -> Cow<'a, str> {
        if field == LOGICAL_ID_FIELD {
            return Cow::Borrowed(ID_FIELD);
        }
        match &self.layout {
            DocumentLayout::Inline => Cow::Borrowed(field),
            DocumentLayout::Nested { prefix } => Cow::Owned(format!("{}.{}", prefix, field)),
        }
    }
}

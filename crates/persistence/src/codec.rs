//! Item codec.
//!
//! Converts an [`Item`] to and from its stored document. The bookkeeping
//! fields (`_id`, `_etag`, `_updated`) stay at the top level; the payload is
//! written inline or under the layout's prefix, without its `"id"` entry.
//! A provisional version token is never written.

use bson::{Bson, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Utc};

use crate::error::{BackendError, StorageResult};
use crate::translate::{DocumentLayout, ETAG_FIELD, ID_FIELD, UPDATED_FIELD};
use crate::types::{ETag, Item, ItemId, PAYLOAD_ID_KEY};

/// Encodes an item into its stored document.
///
/// Fails when an inline payload carries a key reserved for bookkeeping.
pub fn encode_item(item: &Item, layout: &DocumentLayout) -> StorageResult<Document> {
    let mut doc = Document::new();
    doc.insert(ID_FIELD, item.id().to_bson());
    if let Some(token) = item.etag().as_explicit() {
        doc.insert(ETAG_FIELD, token);
    }
    doc.insert(
        UPDATED_FIELD,
        BsonDateTime::from_millis(item.updated().timestamp_millis()),
    );

    let payload = item
        .payload()
        .iter()
        .filter(|(key, _)| key.as_str() != PAYLOAD_ID_KEY);

    match layout {
        DocumentLayout::Inline => {
            for (key, value) in payload {
                if is_reserved(key) {
                    return Err(BackendError::SerializationError {
                        message: format!("payload field '{}' is reserved", key),
                    }
                    .into());
                }
                doc.insert(key.clone(), value.clone());
            }
        }
        DocumentLayout::Nested { prefix } => {
            let nested: Document = payload.map(|(k, v)| (k.clone(), v.clone())).collect();
            doc.insert(prefix.clone(), nested);
        }
    }
    Ok(doc)
}

/// Decodes a stored document into an item.
///
/// A missing or empty `_etag` yields a provisional token and a missing
/// `_updated` yields the Unix epoch.
pub fn decode_item(mut doc: Document, layout: &DocumentLayout) -> StorageResult<Item> {
    let id = match doc.remove(ID_FIELD) {
        Some(value) => ItemId::from_bson(&value)?,
        None => {
            return Err(BackendError::SerializationError {
                message: "stored document has no _id".to_string(),
            }
            .into());
        }
    };

    let etag = match doc.remove(ETAG_FIELD) {
        Some(Bson::String(token)) if !token.is_empty() => ETag::Explicit(token),
        Some(Bson::String(_)) | Some(Bson::Null) | None => ETag::Provisional,
        Some(other) => {
            return Err(BackendError::SerializationError {
                message: format!("_etag has unexpected type {:?}", other.element_type()),
            }
            .into());
        }
    };

    let updated = match doc.remove(UPDATED_FIELD) {
        Some(Bson::DateTime(dt)) => dt.to_chrono(),
        Some(Bson::Null) | None => DateTime::<Utc>::UNIX_EPOCH,
        Some(other) => {
            return Err(BackendError::SerializationError {
                message: format!("_updated has unexpected type {:?}", other.element_type()),
            }
            .into());
        }
    };

    let payload = match layout {
        DocumentLayout::Inline => doc,
        DocumentLayout::Nested { prefix } => match doc.remove(prefix) {
            Some(Bson::Document(nested)) => nested,
            Some(Bson::Null) | None => Document::new(),
            Some(other) => {
                return Err(BackendError::SerializationError {
                    message: format!(
                        "payload field '{}' has unexpected type {:?}",
                        prefix,
                        other.element_type()
                    ),
                }
                .into());
            }
        },
    };

    Ok(Item::from_storage(id, etag, updated, payload))
}

fn is_reserved(key: &str) -> bool {
    matches!(key, ID_FIELD | ETAG_FIELD | UPDATED_FIELD)
}

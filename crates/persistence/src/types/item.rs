//! Stored item types.
//!
//! This module defines the [`Item`] type persisted by the storage engine,
//! its identifier ([`ItemId`]) and version token ([`ETag`]), and the
//! [`ItemList`] page returned by find operations.

use std::fmt;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::{DateTime, SubsecRound, Utc};

use crate::error::BackendError;

/// Payload key under which the item identifier is exposed to callers.
pub const PAYLOAD_ID_KEY: &str = "id";

/// Prefix of version tokens synthesized from the item identifier.
pub const PROVISIONAL_ETAG_PREFIX: &str = "p-";

/// The identifier of an item.
///
/// Identifiers keep their native representation in the store, so a string
/// id, an integer id and an object id never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemId {
    /// A string identifier.
    String(String),
    /// An integer identifier.
    Int(i64),
    /// A 12-byte object identifier.
    ObjectId(ObjectId),
}

impl ItemId {
    /// Generates a fresh object identifier.
    pub fn generate() -> Self {
        ItemId::ObjectId(ObjectId::new())
    }

    /// Returns the native value stored under the primary key.
    pub fn to_bson(&self) -> Bson {
        match self {
            ItemId::String(s) => Bson::String(s.clone()),
            ItemId::Int(n) => Bson::Int64(*n),
            ItemId::ObjectId(oid) => Bson::ObjectId(*oid),
        }
    }

    /// Decodes a primary key read back from the store.
    pub fn from_bson(value: &Bson) -> Result<Self, BackendError> {
        match value {
            Bson::String(s) => Ok(ItemId::String(s.clone())),
            Bson::Int32(n) => Ok(ItemId::Int(i64::from(*n))),
            Bson::Int64(n) => Ok(ItemId::Int(*n)),
            Bson::ObjectId(oid) => Ok(ItemId::ObjectId(*oid)),
            other => Err(BackendError::SerializationError {
                message: format!("unsupported identifier type: {:?}", other.element_type()),
            }),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::String(s) => write!(f, "{}", s),
            ItemId::Int(n) => write!(f, "{}", n),
            ItemId::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
        }
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::String(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId::String(s)
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Int(n)
    }
}

impl From<ObjectId> for ItemId {
    fn from(oid: ObjectId) -> Self {
        ItemId::ObjectId(oid)
    }
}

/// The version token of an item.
///
/// An explicit token is persisted with the item. A provisional token is
/// synthesized at read time for documents written without one, and renders
/// as `"p-" + id`. It is never persisted: using it as the expected version
/// of a write matches only while the stored document still carries no
/// explicit token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ETag {
    /// A token stored alongside the item.
    Explicit(String),
    /// A token derived from the identifier; nothing is stored.
    #[default]
    Provisional,
}

impl ETag {
    /// Creates an explicit token.
    pub fn explicit(token: impl Into<String>) -> Self {
        ETag::Explicit(token.into())
    }

    /// Parses a token as received from a client.
    ///
    /// Tokens in the `"p-…"` form, and empty tokens, are provisional.
    pub fn parse(token: &str) -> Self {
        if token.is_empty() || token.starts_with(PROVISIONAL_ETAG_PREFIX) {
            ETag::Provisional
        } else {
            ETag::Explicit(token.to_string())
        }
    }

    /// Returns `true` for a provisional token.
    pub fn is_provisional(&self) -> bool {
        self.as_explicit().is_none()
    }

    /// Returns the explicit token, if one is set and non-empty.
    pub fn as_explicit(&self) -> Option<&str> {
        match self {
            ETag::Explicit(token) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// Renders the token as exposed to clients.
    pub fn render(&self, id: &ItemId) -> String {
        match self.as_explicit() {
            Some(token) => token.to_string(),
            None => format!("{}{}", PROVISIONAL_ETAG_PREFIX, id),
        }
    }
}

/// A stored item.
///
/// The payload holds the item's fields. Its `"id"` entry mirrors the
/// identifier; the engine never stores it twice.
///
/// # Examples
///
/// ```
/// use bson::doc;
/// use resource_persistence::types::{ETag, Item};
///
/// let item = Item::new("1234", doc! { "foo": "bar" }).with_etag(ETag::explicit("etag1"));
///
/// assert_eq!(item.id().to_string(), "1234");
/// assert_eq!(item.payload().get_str("id").unwrap(), "1234");
/// assert_eq!(item.etag().render(item.id()), "etag1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: ItemId,
    etag: ETag,
    updated: DateTime<Utc>,
    payload: Document,
}

impl Item {
    /// Creates an item with a provisional token, updated now.
    pub fn new(id: impl Into<ItemId>, payload: Document) -> Self {
        Self::from_storage(id.into(), ETag::Provisional, Utc::now(), payload)
    }

    /// Creates an item from stored parts.
    ///
    /// The update time is truncated to the store's millisecond precision and
    /// the identifier is injected into the payload.
    pub fn from_storage(
        id: ItemId,
        etag: ETag,
        updated: DateTime<Utc>,
        mut payload: Document,
    ) -> Self {
        payload.insert(PAYLOAD_ID_KEY, id.to_bson());
        Self {
            id,
            etag,
            updated: updated.trunc_subsecs(3),
            payload,
        }
    }

    /// Replaces the version token.
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = etag;
        self
    }

    /// Replaces the update time.
    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = updated.trunc_subsecs(3);
        self
    }

    /// Returns the identifier.
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Returns the version token.
    pub fn etag(&self) -> &ETag {
        &self.etag
    }

    /// Returns the last modification time.
    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Returns the payload, including the `"id"` entry.
    pub fn payload(&self) -> &Document {
        &self.payload
    }

    /// Returns the payload mutably.
    pub fn payload_mut(&mut self) -> &mut Document {
        &mut self.payload
    }

    /// Consumes the item and returns its payload.
    pub fn into_payload(self) -> Document {
        self.payload
    }
}

/// A page of items returned by a find operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemList {
    /// Number of items matching the query, when it can be deduced.
    ///
    /// `None` means the total is unknown without a separate count.
    pub total: Option<u64>,

    /// The limit the page was fetched with, `None` when unbounded.
    pub limit: Option<u64>,

    /// The items of the page.
    pub items: Vec<Item>,
}

impl ItemList {
    /// Returns the number of items in the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the page holds no item.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the total in its wire form, `-1` when unknown.
    pub fn wire_total(&self) -> i64 {
        self.total
            .and_then(|t| i64::try_from(t).ok())
            .unwrap_or(-1)
    }
}

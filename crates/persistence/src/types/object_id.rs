//! Object identifier field.
//!
//! Helpers for resources whose identifier is a store object id exposed to
//! clients as a 24-character hex string.

use bson::Bson;
use bson::oid::ObjectId;
use serde_json::{Value, json};

use crate::error::ValidationError;

const OBJECT_ID_HEX_LEN: usize = 24;

/// Validator and serializer for object id fields.
///
/// # Examples
///
/// ```
/// use bson::Bson;
/// use resource_persistence::types::ObjectIdField;
///
/// let oid = ObjectIdField::validate(&Bson::from("59a40602952dbd0001c3ffc9")).unwrap();
/// let hex = ObjectIdField::serialize(&Bson::ObjectId(oid)).unwrap();
/// assert_eq!(hex, "59a40602952dbd0001c3ffc9");
///
/// assert!(ObjectIdField::validate(&Bson::from("59a40602952dbd0001c3ffc9f")).is_err());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdField;

impl ObjectIdField {
    /// Checks that `value` is a hex-encoded object id and decodes it.
    pub fn validate(value: &Bson) -> Result<ObjectId, ValidationError> {
        let Bson::String(s) = value else {
            return Err(invalid("invalid object id"));
        };
        if s.len() != OBJECT_ID_HEX_LEN {
            return Err(invalid("invalid object id length"));
        }
        ObjectId::parse_str(s).map_err(|_| invalid("invalid object id"))
    }

    /// Encodes a stored object id back to its hex form.
    pub fn serialize(value: &Bson) -> Result<String, ValidationError> {
        match value {
            Bson::ObjectId(oid) => Ok(oid.to_hex()),
            _ => Err(invalid("not an ObjectId")),
        }
    }

    /// Returns the JSON schema describing the field's wire form.
    pub fn json_schema() -> Value {
        json!({
            "type": "string",
            "pattern": "^[0-9a-fA-F]{24}$",
        })
    }
}

/// Field initializer that fills a missing id with a fresh object id hex.
pub fn new_object_id(value: Option<Bson>) -> Bson {
    value.unwrap_or_else(|| Bson::String(ObjectId::new().to_hex()))
}

fn invalid(message: &str) -> ValidationError {
    ValidationError::InvalidObjectId {
        message: message.to_string(),
    }
}

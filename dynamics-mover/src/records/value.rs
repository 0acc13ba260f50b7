//! Attribute value representation for migrated records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityReference;

/// A value held by one attribute of a record
///
/// Lookups and bare identifiers are kept apart on purpose: only `Reference`
/// values are written back as `@odata.bind` and split off for the deferred
/// pass, while an `Identifier` is just a GUID column (primary keys, the two
/// side keys of an intersect record, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum AttributeValue {
    /// Primitive value
    Scalar(Scalar),
    /// Bare unique identifier, not typed as a lookup
    Identifier(Uuid),
    /// Lookup to another record
    Reference(EntityReference),
}

/// Primitive attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Scalar {
    /// Null/empty value
    Null,
    /// String or memo
    String(String),
    /// Whole number
    Int(i64),
    /// Decimal or floating point number
    Float(f64),
    /// Two options
    Bool(bool),
    /// Date and time
    DateTime(DateTime<Utc>),
    /// Option set, state or status value
    OptionSet(i32),
    /// Currency amount
    Money(f64),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        AttributeValue::Scalar(Scalar::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        AttributeValue::Scalar(Scalar::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        AttributeValue::Scalar(Scalar::Bool(value))
    }

    pub fn option_set(value: i32) -> Self {
        AttributeValue::Scalar(Scalar::OptionSet(value))
    }

    pub fn identifier(id: Uuid) -> Self {
        AttributeValue::Identifier(id)
    }

    pub fn reference(entity_type: impl Into<String>, id: Uuid) -> Self {
        AttributeValue::Reference(EntityReference::new(entity_type, id))
    }

    /// Check if this value is a lookup
    pub fn is_reference(&self) -> bool {
        matches!(self, AttributeValue::Reference(_))
    }

    /// Check if this value is a bare identifier
    pub fn is_identifier(&self) -> bool {
        matches!(self, AttributeValue::Identifier(_))
    }

    /// Try to get as lookup
    pub fn as_reference(&self) -> Option<&EntityReference> {
        match self {
            AttributeValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as bare identifier
    pub fn as_identifier(&self) -> Option<Uuid> {
        match self {
            AttributeValue::Identifier(id) => Some(*id),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric option set value; plain integers are accepted too since
    /// hand-written import files rarely distinguish the two
    pub fn as_option_set(&self) -> Option<i32> {
        match self {
            AttributeValue::Scalar(Scalar::OptionSet(v)) => Some(*v),
            AttributeValue::Scalar(Scalar::Int(v)) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Convert to a JSON value for API payloads
    ///
    /// Returns `None` for lookups: those need entity set and navigation
    /// property names and are bound by the store.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            AttributeValue::Scalar(scalar) => Some(scalar.to_json()),
            AttributeValue::Identifier(id) => Some(serde_json::Value::String(id.to_string())),
            AttributeValue::Reference(_) => None,
        }
    }
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::String(s) => serde_json::Value::String(s.clone()),
            Scalar::Int(i) => serde_json::json!(*i),
            Scalar::Float(f) | Scalar::Money(f) => serde_json::json!(*f),
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Scalar::OptionSet(v) => serde_json::json!(*v),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Scalar(s) => write!(f, "{}", s),
            AttributeValue::Identifier(id) => write!(f, "{}", id),
            AttributeValue::Reference(r) => write!(f, "{}", r),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "(null)"),
            Scalar::String(s) => write!(f, "{}", s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(fl) | Scalar::Money(fl) => write!(f, "{}", fl),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Scalar::OptionSet(v) => write!(f, "{}", v),
        }
    }
}

impl From<Scalar> for AttributeValue {
    fn from(value: Scalar) -> Self {
        AttributeValue::Scalar(value)
    }
}

impl From<EntityReference> for AttributeValue {
    fn from(value: EntityReference) -> Self {
        AttributeValue::Reference(value)
    }
}

//! Typed field values.
//!
//! Sources speak loosely typed payloads (SQL text columns, CRM JSON). Values
//! are converted into a [`FieldValue`] at the adapter boundary, using the
//! canonical field's [`FieldType`](crate::FieldType), so the reconciler
//! compares typed values rather than opaque blobs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A present field value. An unset field is represented by the absence of a
/// `FieldValue` (`Option::None`), never by an empty variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Date(NaiveDate),
    Enum(String),
    Binary(Vec<u8>),
    List(Vec<String>),
}

impl FieldValue {
    /// Short lowercase name of the variant, matching the schema type names.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Bool(_) => "bool",
            FieldValue::Date(_) => "date",
            FieldValue::Enum(_) => "enum",
            FieldValue::Binary(_) => "binary",
            FieldValue::List(_) => "list",
        }
    }

    /// Plain JSON rendering, as a JSON-speaking source expects it.
    ///
    /// Dates render as `YYYY-MM-DD`, binary as lowercase hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) | FieldValue::Enum(s) => serde_json::Value::String(s.clone()),
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Binary(bytes) => serde_json::Value::String(hex::encode(bytes)),
            FieldValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Enum(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

//! History Record
//!
//! The persisted audit entity. Wire shape:
//!
//! ```text
//! { "t": <RFC 3339 timestamp>, "o": "i" | "u" | "r", "d": { ...payload }, ...metadata }
//! ```
//!
//! A record is immutable once built. Metadata is attached exactly once, by
//! consuming the record, before it is handed to the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{HistoryError, HistoryResult};

/// A document snapshot: field name to value
pub type Document = Map<String, Value>;

/// Field names reserved by the record envelope
pub const RESERVED_FIELDS: [&str; 3] = ["t", "o", "d"];

/// Kind of mutation that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationCode {
    /// Document created
    #[serde(rename = "i")]
    Insert,
    /// Document changed
    #[serde(rename = "u")]
    Update,
    /// Document removed
    #[serde(rename = "r")]
    Remove,
}

impl OperationCode {
    /// Returns the stored discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::Insert => "i",
            OperationCode::Update => "u",
            OperationCode::Remove => "r",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,

    #[serde(rename = "o")]
    operation: OperationCode,

    #[serde(rename = "d")]
    payload: Document,

    #[serde(flatten)]
    metadata: Document,
}

impl HistoryRecord {
    /// Build a record from a snapshot or diff.
    ///
    /// The version marker is stripped and the timestamp set to now.
    pub fn build(mut payload: Document, operation: OperationCode, version_field: &str) -> Self {
        payload.remove(version_field);

        Self {
            timestamp: Utc::now(),
            operation,
            payload,
            metadata: Document::new(),
        }
    }

    /// Attach resolved metadata fields, consuming the record.
    pub(crate) fn with_metadata(mut self, fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.metadata.extend(fields);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn operation(&self) -> OperationCode {
        self.operation
    }

    pub fn payload(&self) -> &Document {
        &self.payload
    }

    pub fn metadata(&self) -> &Document {
        &self.metadata
    }

    /// Look up a metadata field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Serialize to the stored JSON shape
    pub fn to_value(&self) -> HistoryResult<Value> {
        serde_json::to_value(self).map_err(|e| HistoryError::StoreFailed(e.to_string()))
    }
}

/// Interpret a JSON value as a document snapshot
pub fn into_document(value: Value) -> HistoryResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(HistoryError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

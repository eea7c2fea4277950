//! Unified Operation Model
//!
//! Every data operation routes through this enum. Mutations pass the
//! history middleware before they reach storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All data operations route through this enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Read(ReadOp),
    Write(WriteOp),
    Replace(ReplaceOp),
    Update(UpdateOp),
    Delete(DeleteOp),
}

impl Operation {
    /// Get the collection name
    pub fn collection(&self) -> &str {
        match self {
            Self::Read(r) => &r.collection,
            Self::Write(w) => &w.collection,
            Self::Replace(r) => &r.collection,
            Self::Update(u) => &u.collection,
            Self::Delete(d) => &d.collection,
        }
    }

    /// Get operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Replace(_) => "replace",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }

    /// Whether the operation changes stored data
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read(_))
    }
}

/// Read a single document by ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOp {
    pub collection: String,
    pub id: String,
}

/// Write a new document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOp {
    pub collection: String,
    pub document: Value,
}

/// Save an existing document in full
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOp {
    pub collection: String,
    pub id: String,
    pub document: Value,
}

/// Apply a change set to an existing document.
///
/// `updates` is either a plain field map or `{"$set": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub collection: String,
    pub id: String,
    pub updates: Value,
}

/// Delete a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOp {
    pub collection: String,
    pub id: String,
}

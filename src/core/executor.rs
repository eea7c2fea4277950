//! Unified Executor
//!
//! Final pipeline stage: routes operations to the storage backend.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use crate::core::context::RequestContext;
use crate::core::error::CoreError;
use crate::core::operation::{DeleteOp, Operation, ReadOp, ReplaceOp, UpdateOp, WriteOp};
use crate::core::pipeline::{OperationExecutor, OperationResult};
use crate::history::{into_document, update_payload};

/// Storage key of a document identifier.
///
/// Strings are used as-is, any other value by its JSON text.
pub fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Trait for the storage backend
pub trait StorageBackend: Send + Sync {
    /// Read a document by ID
    fn read(&self, collection: &str, id: &str) -> Result<Option<Value>, String>;

    /// Write a new document, returning its ID
    fn write(&self, collection: &str, document: Value) -> Result<String, String>;

    /// Replace an existing document in full
    fn replace(&self, collection: &str, id: &str, document: Value) -> Result<Value, String>;

    /// Merge a change set into an existing document
    fn update(&self, collection: &str, id: &str, updates: Value) -> Result<Value, String>;

    /// Delete a document
    fn delete(&self, collection: &str, id: &str) -> Result<bool, String>;
}

/// Unified executor that routes operations to storage
pub struct UnifiedExecutor {
    storage: Arc<dyn StorageBackend>,
}

impl UnifiedExecutor {
    /// Create a new unified executor
    pub fn new(storage: impl StorageBackend + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Create an executor over storage shared with other pipeline stages
    pub fn shared(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

impl OperationExecutor for UnifiedExecutor {
    fn execute(
        &self,
        op: &Operation,
        _ctx: &RequestContext,
    ) -> Pin<Box<dyn Future<Output = OperationResult> + Send + '_>> {
        let storage = Arc::clone(&self.storage);
        let op_clone = op.clone();

        Box::pin(async move {
            match op_clone {
                Operation::Read(read) => execute_read(&storage, &read),
                Operation::Write(write) => execute_write(&storage, &write),
                Operation::Replace(replace) => execute_replace(&storage, &replace),
                Operation::Update(update) => execute_update(&storage, &update),
                Operation::Delete(delete) => execute_delete(&storage, &delete),
            }
        })
    }
}

fn not_found(id: &str, collection: &str) -> CoreError {
    CoreError::not_found(format!("Document {} not found in {}", id, collection))
}

fn execute_read(storage: &Arc<dyn StorageBackend>, op: &ReadOp) -> OperationResult {
    storage
        .read(&op.collection, &op.id)
        .map_err(CoreError::execution)?
        .ok_or_else(|| not_found(&op.id, &op.collection))
}

fn execute_write(storage: &Arc<dyn StorageBackend>, op: &WriteOp) -> OperationResult {
    if !op.document.is_object() {
        return Err(CoreError::validation("document must be a JSON object"));
    }

    let id = storage
        .write(&op.collection, op.document.clone())
        .map_err(CoreError::execution)?;

    Ok(json!({
        "id": id,
        "collection": op.collection,
        "created": true
    }))
}

fn execute_replace(storage: &Arc<dyn StorageBackend>, op: &ReplaceOp) -> OperationResult {
    if !op.document.is_object() {
        return Err(CoreError::validation("document must be a JSON object"));
    }
    if storage
        .read(&op.collection, &op.id)
        .map_err(CoreError::execution)?
        .is_none()
    {
        return Err(not_found(&op.id, &op.collection));
    }

    storage
        .replace(&op.collection, &op.id, op.document.clone())
        .map_err(CoreError::execution)
}

fn execute_update(storage: &Arc<dyn StorageBackend>, op: &UpdateOp) -> OperationResult {
    if storage
        .read(&op.collection, &op.id)
        .map_err(CoreError::execution)?
        .is_none()
    {
        return Err(not_found(&op.id, &op.collection));
    }

    storage
        .update(&op.collection, &op.id, op.updates.clone())
        .map_err(CoreError::execution)
}

fn execute_delete(storage: &Arc<dyn StorageBackend>, op: &DeleteOp) -> OperationResult {
    let deleted = storage
        .delete(&op.collection, &op.id)
        .map_err(CoreError::execution)?;

    if !deleted {
        return Err(not_found(&op.id, &op.collection));
    }

    Ok(json!({
        "id": op.id,
        "collection": op.collection,
        "deleted": true
    }))
}

/// In-memory storage backend for testing and embedding
#[derive(Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`
    pub fn count(&self, collection: &str) -> usize {
        self.data
            .read()
            .map(|d| d.get(collection).map(HashMap::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl StorageBackend for InMemoryStorage {
    fn read(&self, collection: &str, id: &str) -> Result<Option<Value>, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.get(collection).and_then(|c| c.get(id)).cloned())
    }

    fn write(&self, collection: &str, mut document: Value) -> Result<String, String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        let obj = document
            .as_object_mut()
            .ok_or_else(|| "document must be a JSON object".to_string())?;
        let id = match obj.get("_id") {
            Some(existing) => id_string(existing),
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                obj.insert("_id".to_string(), Value::String(generated.clone()));
                generated
            }
        };

        let coll = data.entry(collection.to_string()).or_default();
        if coll.contains_key(&id) {
            return Err(format!("Document {} already exists in {}", id, collection));
        }
        coll.insert(id.clone(), document);

        Ok(id)
    }

    fn replace(&self, collection: &str, id: &str, mut document: Value) -> Result<Value, String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        let doc = data
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| format!("Document {} not found", id))?;

        // The identifier survives a full save.
        if let (Some(new_obj), Some(stored_id)) = (document.as_object_mut(), doc.get("_id")) {
            new_obj.insert("_id".to_string(), stored_id.clone());
        }
        *doc = document;

        Ok(doc.clone())
    }

    fn update(&self, collection: &str, id: &str, updates: Value) -> Result<Value, String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        let doc = data
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| format!("Document {} not found", id))?;

        let changes = update_payload(into_document(updates).map_err(|e| e.to_string())?);
        if let Some(doc_obj) = doc.as_object_mut() {
            for (k, v) in changes {
                if k != "_id" {
                    doc_obj.insert(k, v);
                }
            }
        }

        Ok(doc.clone())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        Ok(data
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }
}

//! History Store
//!
//! The storage collaborator for history records. A store persists single
//! records and clears whole history collections. It does not query.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::errors::{HistoryError, HistoryResult};
use super::metadata::BoxFuture;
use super::record::{Document, HistoryRecord};

/// Persistence for history records
pub trait HistoryStore: Send + Sync {
    /// Durably save one record into `collection`.
    ///
    /// The record MUST be persisted when the future resolves `Ok`.
    fn save<'a>(
        &'a self,
        collection: &'a str,
        record: &'a HistoryRecord,
    ) -> BoxFuture<'a, Result<(), String>>;

    /// Save one record, failing with [`HistoryError::Timeout`] when `limit`
    /// runs out.
    ///
    /// A timeout MUST mean nothing was persisted. The default bounds the
    /// whole save, which holds for stores whose saves stop when dropped.
    /// Stores that cannot abandon a started write bound only the wait
    /// before it.
    fn save_within<'a>(
        &'a self,
        collection: &'a str,
        record: &'a HistoryRecord,
        limit: Duration,
    ) -> BoxFuture<'a, HistoryResult<()>> {
        Box::pin(async move {
            tokio::time::timeout(limit, self.save(collection, record))
                .await
                .map_err(|_| HistoryError::timeout("save"))?
                .map_err(HistoryError::StoreFailed)
        })
    }

    /// Remove every record of `collection`
    fn remove_all<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), String>>;
}

/// Lookup of the currently stored state of a source document
pub trait SnapshotSource: Send + Sync {
    fn find_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Option<Document>, String>>;
}

/// Source that never finds anything; diff-mode saves without a captured
/// original then fall back to a self baseline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSnapshotSource;

impl SnapshotSource for NoSnapshotSource {
    fn find_by_id<'a>(
        &'a self,
        _collection: &'a str,
        _id: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Option<Document>, String>> {
        Box::pin(async { Ok(None) })
    }
}

/// In-memory history store for testing and embedding
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    collections: RwLock<HashMap<String, Vec<HistoryRecord>>>,
    fail_writes: AtomicBool,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save and clear fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All records saved to `collection`, in save order
    pub fn records(&self, collection: &str) -> Vec<HistoryRecord> {
        self.collections
            .read()
            .map(|c| c.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of records across all collections
    pub fn total(&self) -> usize {
        self.collections
            .read()
            .map(|c| c.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn check_writable(&self) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err("history store is not accepting writes".to_string())
        } else {
            Ok(())
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save<'a>(
        &'a self,
        collection: &'a str,
        record: &'a HistoryRecord,
    ) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            self.check_writable()?;
            let mut collections = self.collections.write().map_err(|e| e.to_string())?;
            collections
                .entry(collection.to_string())
                .or_default()
                .push(record.clone());
            Ok(())
        })
    }

    fn remove_all<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            self.check_writable()?;
            let mut collections = self.collections.write().map_err(|e| e.to_string())?;
            collections.remove(collection);
            Ok(())
        })
    }
}

/// Handle on the history collection of one source collection
#[derive(Clone)]
pub struct HistoryCollection {
    name: String,
    store: Arc<dyn HistoryStore>,
}

impl HistoryCollection {
    pub fn new(name: impl Into<String>, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Name of the history collection
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Save a record into this collection
    pub async fn save(&self, record: &HistoryRecord) -> Result<(), String> {
        self.store.save(&self.name, record).await
    }

    /// Remove every record of this collection
    pub async fn clear(&self) -> Result<(), String> {
        self.store.remove_all(&self.name).await
    }
}

impl std::fmt::Debug for HistoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCollection")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record::OperationCode;

    fn record() -> HistoryRecord {
        HistoryRecord::build(Document::new(), OperationCode::Insert, "__v")
    }

    #[tokio::test]
    async fn test_memory_store_save_and_clear() {
        let store = MemoryHistoryStore::new();
        store.save("users_history", &record()).await.unwrap();
        store.save("users_history", &record()).await.unwrap();
        store.save("posts_history", &record()).await.unwrap();

        assert_eq!(store.records("users_history").len(), 2);
        assert_eq!(store.total(), 3);

        store.remove_all("users_history").await.unwrap();
        assert!(store.records("users_history").is_empty());
        assert_eq!(store.records("posts_history").len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failing_writes() {
        let store = MemoryHistoryStore::new();
        store.set_fail_writes(true);

        assert!(store.save("users_history", &record()).await.is_err());
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn test_history_collection_handle() {
        let store = Arc::new(MemoryHistoryStore::new());
        let collection = HistoryCollection::new("users_history", store.clone());

        collection.save(&record()).await.unwrap();
        assert_eq!(store.records("users_history").len(), 1);

        collection.clear().await.unwrap();
        assert_eq!(store.total(), 0);
        assert_eq!(collection.name(), "users_history");
    }

    #[tokio::test]
    async fn test_no_snapshot_source() {
        let found = NoSnapshotSource
            .find_by_id("users", &serde_json::json!(1))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}

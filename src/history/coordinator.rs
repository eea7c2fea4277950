//! Mutation Coordinator
//!
//! Turns one mutation into one saved history record:
//!
//! ```text
//! resolve before-snapshot → diff or snapshot → build → enrich → save
//! ```
//!
//! Every step is awaited in order and the first error is returned. The
//! record is only returned once the store has acknowledged the save.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::config::HistoryConfig;
use super::diff::DiffEngine;
use super::errors::{HistoryError, HistoryResult};
use super::metadata::MetadataEnricher;
use super::record::{Document, HistoryRecord, OperationCode};
use super::store::{HistoryCollection, HistoryStore, NoSnapshotSource, SnapshotSource};
use crate::observability::Event;

/// A mutation as seen by the interception point
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// A new document is created
    Insert { document: Document },
    /// An existing document is saved in full.
    ///
    /// `original` is the snapshot captured when the document was loaded, if any.
    Save {
        original: Option<Document>,
        current: Document,
    },
    /// An update/updateOne/findOneAndUpdate style change set
    BulkUpdate { update: Document },
    /// A loaded document instance is removed
    Remove { document: Document },
    /// A document found by query is removed
    FindAndRemove { document: Document },
}

impl Mutation {
    /// Get mutation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Save { .. } => "save",
            Mutation::BulkUpdate { .. } => "bulk_update",
            Mutation::Remove { .. } => "remove",
            Mutation::FindAndRemove { .. } => "find_and_remove",
        }
    }
}

/// Payload of a bulk update: the `$set` object when present, else the
/// raw update document.
pub fn update_payload(update: Document) -> Document {
    match update.get("$set") {
        Some(Value::Object(set)) => set.clone(),
        _ => update,
    }
}

/// Coordinates history recording for mutations
pub struct MutationCoordinator {
    diff_only: bool,
    id_field: String,
    version_field: String,
    custom_collection_name: Option<String>,
    timeout: Option<Duration>,
    diff: DiffEngine,
    enricher: MetadataEnricher,
    store: Arc<dyn HistoryStore>,
    snapshots: Arc<dyn SnapshotSource>,
}

/// What a mutation contributes to the pipeline
struct Prepared {
    payload: Document,
    operation: OperationCode,
    before: Option<Document>,
    after: Option<Document>,
}

impl MutationCoordinator {
    /// Create a coordinator; the configuration is validated first
    pub fn new(config: &HistoryConfig, store: Arc<dyn HistoryStore>) -> HistoryResult<Self> {
        config.validate()?;

        Ok(Self {
            diff_only: config.options.diff_only,
            id_field: config.options.id_field.clone(),
            version_field: config.options.version_field.clone(),
            custom_collection_name: config.options.custom_collection_name.clone(),
            timeout: config.options.async_timeout(),
            diff: config.diff_engine(),
            enricher: config.enricher(),
            store,
            snapshots: Arc::new(NoSnapshotSource),
        })
    }

    /// Use `source` to re-fetch prior snapshots that were not captured
    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots = source;
        self
    }

    pub fn diff_only(&self) -> bool {
        self.diff_only
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Record the history of one mutation on `collection`
    pub async fn record(&self, collection: &str, mutation: Mutation) -> HistoryResult<HistoryRecord> {
        let kind = mutation.name();
        let prepared = self.prepare(collection, mutation).await?;

        let record = HistoryRecord::build(prepared.payload, prepared.operation, &self.version_field);

        let record = self
            .enricher
            .enrich(prepared.before.as_ref(), prepared.after.as_ref(), record)
            .await
            .map_err(|e| {
                tracing::error!(
                    event = %Event::MetadataFailed,
                    collection,
                    mutation = kind,
                    code = e.code(),
                    error = %e,
                    "history record not saved"
                );
                e
            })?;

        let history_name = self.history_collection_name(collection);
        let saved = match self.timeout {
            Some(limit) => self.store.save_within(&history_name, &record, limit).await,
            None => self
                .store
                .save(&history_name, &record)
                .await
                .map_err(HistoryError::StoreFailed),
        };
        saved.map_err(|e| {
            tracing::error!(
                event = %Event::SaveFailed,
                collection = %history_name,
                mutation = kind,
                code = e.code(),
                error = %e,
                "history record not saved"
            );
            e
        })?;

        tracing::info!(
            event = %Event::Recorded,
            collection = %history_name,
            mutation = kind,
            operation = %record.operation(),
            fields = record.payload().len(),
        );

        Ok(record)
    }

    /// History collection name for `source`
    pub fn history_collection_name(&self, source: &str) -> String {
        super::config::history_collection_name(source, self.custom_collection_name.as_deref())
    }

    /// Accessor for the history collection of `source`
    pub fn history_collection(&self, source: &str) -> HistoryCollection {
        HistoryCollection::new(self.history_collection_name(source), Arc::clone(&self.store))
    }

    /// Remove every history record of `source`
    pub async fn clear_history(&self, source: &str) -> HistoryResult<()> {
        let collection = self.history_collection(source);
        self.bounded("clear", collection.clear())
            .await?
            .map_err(HistoryError::StoreFailed)?;

        tracing::info!(event = %Event::Cleared, collection = collection.name());
        Ok(())
    }

    async fn prepare(&self, collection: &str, mutation: Mutation) -> HistoryResult<Prepared> {
        let prepared = match mutation {
            Mutation::Insert { document } => Prepared {
                payload: document.clone(),
                operation: OperationCode::Insert,
                before: None,
                after: Some(document),
            },
            Mutation::Save { original, current } if self.diff_only => {
                let before = match original {
                    Some(original) => Some(original),
                    None => self.refetch(collection, &current).await?,
                };
                Prepared {
                    payload: self.diff.compute_diff(before.as_ref(), &current),
                    operation: OperationCode::Update,
                    before,
                    after: Some(current),
                }
            }
            Mutation::Save { original, current } => Prepared {
                payload: current.clone(),
                operation: OperationCode::Update,
                before: original,
                after: Some(current),
            },
            Mutation::BulkUpdate { update } => {
                let payload = update_payload(update);
                Prepared {
                    payload: payload.clone(),
                    operation: OperationCode::Update,
                    before: None,
                    after: Some(payload),
                }
            }
            Mutation::Remove { document } => Prepared {
                payload: document.clone(),
                operation: OperationCode::Remove,
                before: Some(document.clone()),
                after: Some(document),
            },
            Mutation::FindAndRemove { document } => Prepared {
                payload: document.clone(),
                operation: OperationCode::Remove,
                before: None,
                after: Some(document),
            },
        };
        Ok(prepared)
    }

    /// Re-fetch the stored state of `current` by identifier
    async fn refetch(&self, collection: &str, current: &Document) -> HistoryResult<Option<Document>> {
        let Some(id) = current.get(&self.id_field) else {
            return Ok(None);
        };

        tracing::debug!(event = %Event::SnapshotRefetch, collection, id = %id);

        self.bounded("snapshot_refetch", self.snapshots.find_by_id(collection, id))
            .await?
            .map_err(HistoryError::SnapshotFetchFailed)
    }

    async fn bounded<T>(&self, stage: &str, pending: impl Future<Output = T>) -> HistoryResult<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| HistoryError::timeout(stage)),
            None => Ok(pending.await),
        }
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("diff_only", &self.diff_only)
            .field("id_field", &self.id_field)
            .field("version_field", &self.version_field)
            .field("custom_collection_name", &self.custom_collection_name)
            .field("timeout", &self.timeout)
            .field("metadata", &self.enricher.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::metadata::{BoxFuture, MetadataDescriptor};
    use crate::history::record::into_document;
    use crate::history::store::MemoryHistoryStore;
    use serde_json::json;
    use std::collections::HashMap;

    fn doc(value: Value) -> Document {
        into_document(value).unwrap()
    }

    /// Snapshot source backed by a fixed map of id → document
    struct FixedSource(HashMap<String, Document>);

    impl SnapshotSource for FixedSource {
        fn find_by_id<'a>(
            &'a self,
            _collection: &'a str,
            id: &'a Value,
        ) -> BoxFuture<'a, Result<Option<Document>, String>> {
            let found = self.0.get(&id.to_string()).cloned();
            Box::pin(async move { Ok(found) })
        }
    }

    struct BrokenSource;

    impl SnapshotSource for BrokenSource {
        fn find_by_id<'a>(
            &'a self,
            _collection: &'a str,
            _id: &'a Value,
        ) -> BoxFuture<'a, Result<Option<Document>, String>> {
            Box::pin(async { Err("connection reset".to_string()) })
        }
    }

    fn coordinator(config: HistoryConfig) -> (MutationCoordinator, Arc<MemoryHistoryStore>) {
        let store = Arc::new(MemoryHistoryStore::new());
        let coordinator = MutationCoordinator::new(&config, store.clone()).unwrap();
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_insert_records_snapshot() {
        let (coordinator, store) = coordinator(HistoryConfig::default());

        let document = doc(json!({"_id": 1, "name": "a", "__v": 0}));
        let record = coordinator
            .record("users", Mutation::Insert { document })
            .await
            .unwrap();

        assert_eq!(record.operation(), OperationCode::Insert);
        assert_eq!(Value::Object(record.payload().clone()), json!({"_id": 1, "name": "a"}));
        assert_eq!(store.records("users_history"), vec![record]);
    }

    #[tokio::test]
    async fn test_save_without_diff_records_full_snapshot() {
        let (coordinator, store) = coordinator(HistoryConfig::default());

        let record = coordinator
            .record(
                "users",
                Mutation::Save {
                    original: Some(doc(json!({"_id": 1, "name": "a", "qty": 5}))),
                    current: doc(json!({"_id": 1, "name": "b", "qty": 5})),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.operation(), OperationCode::Update);
        assert_eq!(
            Value::Object(record.payload().clone()),
            json!({"_id": 1, "name": "b", "qty": 5})
        );
        assert_eq!(store.records("users_history").len(), 1);
    }

    #[tokio::test]
    async fn test_save_in_diff_mode_records_changes() {
        let (coordinator, _store) = coordinator(HistoryConfig::default().diff_only(true));

        let record = coordinator
            .record(
                "users",
                Mutation::Save {
                    original: Some(doc(json!({"_id": 1, "name": "a", "qty": 5}))),
                    current: doc(json!({"_id": 1, "name": "b", "qty": 5})),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.operation(), OperationCode::Update);
        assert_eq!(Value::Object(record.payload().clone()), json!({"_id": 1, "name": "b"}));
    }

    #[tokio::test]
    async fn test_diff_mode_refetches_missing_original() {
        let mut stored = HashMap::new();
        stored.insert("1".to_string(), doc(json!({"_id": 1, "name": "a", "qty": 5})));

        let (coordinator, _store) = coordinator(HistoryConfig::default().diff_only(true));
        let coordinator = coordinator.with_snapshot_source(Arc::new(FixedSource(stored)));

        let record = coordinator
            .record(
                "users",
                Mutation::Save {
                    original: None,
                    current: doc(json!({"_id": 1, "name": "a", "qty": 6})),
                },
            )
            .await
            .unwrap();

        assert_eq!(Value::Object(record.payload().clone()), json!({"_id": 1, "qty": 6}));
    }

    #[tokio::test]
    async fn test_diff_mode_without_any_snapshot_falls_back() {
        let (coordinator, store) = coordinator(HistoryConfig::default().diff_only(true));

        let record = coordinator
            .record(
                "users",
                Mutation::Save {
                    original: None,
                    current: doc(json!({"_id": 3, "name": "changed"})),
                },
            )
            .await
            .unwrap();

        assert_eq!(Value::Object(record.payload().clone()), json!({"_id": 3}));
        assert_eq!(store.records("users_history").len(), 1);
    }

    #[tokio::test]
    async fn test_refetch_error_propagates() {
        let (coordinator, store) = coordinator(HistoryConfig::default().diff_only(true));
        let coordinator = coordinator.with_snapshot_source(Arc::new(BrokenSource));

        let err = coordinator
            .record(
                "users",
                Mutation::Save {
                    original: None,
                    current: doc(json!({"_id": 3})),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err, HistoryError::SnapshotFetchFailed("connection reset".into()));
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn test_bulk_update_records_set_payload() {
        let (coordinator, _store) = coordinator(HistoryConfig::default().diff_only(true));

        let record = coordinator
            .record(
                "tasks",
                Mutation::BulkUpdate {
                    update: doc(json!({"$set": {"status": "done"}})),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.operation(), OperationCode::Update);
        assert_eq!(Value::Object(record.payload().clone()), json!({"status": "done"}));
    }

    #[test]
    fn test_update_payload_without_set() {
        let raw = doc(json!({"status": "done", "$inc": {"n": 1}}));
        assert_eq!(update_payload(raw.clone()), raw);

        let not_object = doc(json!({"$set": 5}));
        assert_eq!(update_payload(not_object.clone()), not_object);
    }

    #[tokio::test]
    async fn test_remove_records_snapshot() {
        let (coordinator, store) = coordinator(HistoryConfig::default());

        coordinator
            .record("items", Mutation::Remove { document: doc(json!({"_id": 7, "name": "x"})) })
            .await
            .unwrap();
        coordinator
            .record(
                "items",
                Mutation::FindAndRemove { document: doc(json!({"_id": 8, "name": "y", "__v": 2})) },
            )
            .await
            .unwrap();

        let records = store.records("items_history");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.operation() == OperationCode::Remove));
        assert_eq!(Value::Object(records[0].payload().clone()), json!({"_id": 7, "name": "x"}));
        assert_eq!(Value::Object(records[1].payload().clone()), json!({"_id": 8, "name": "y"}));
    }

    #[tokio::test]
    async fn test_metadata_snapshots_per_mutation() {
        let config = HistoryConfig::default().with_metadata(MetadataDescriptor::derive(
            "had_before",
            |before, _after| json!(before.is_some()),
        ));
        let (coordinator, _store) = coordinator(config);
        let document = doc(json!({"_id": 1}));

        let insert = coordinator
            .record("c", Mutation::Insert { document: document.clone() })
            .await
            .unwrap();
        let remove = coordinator
            .record("c", Mutation::Remove { document: document.clone() })
            .await
            .unwrap();
        let found = coordinator
            .record("c", Mutation::FindAndRemove { document })
            .await
            .unwrap();

        assert_eq!(insert.get("had_before"), Some(&json!(false)));
        assert_eq!(remove.get("had_before"), Some(&json!(true)));
        assert_eq!(found.get("had_before"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_metadata_failure_saves_nothing() {
        let config = HistoryConfig::default()
            .with_metadata(MetadataDescriptor::field("actor", "userId"))
            .with_metadata(MetadataDescriptor::derive_async("session", |_, _| async {
                Err::<Value, _>("session store down".to_string())
            }));
        let (coordinator, store) = coordinator(config);

        let err = coordinator
            .record("users", Mutation::Insert { document: doc(json!({"_id": 1, "userId": 42})) })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "AERO_HISTORY_METADATA_FAILED");
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_verbatim() {
        let (coordinator, store) = coordinator(HistoryConfig::default());
        store.set_fail_writes(true);

        let err = coordinator
            .record("users", Mutation::Insert { document: doc(json!({"_id": 1})) })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            HistoryError::StoreFailed("history store is not accepting writes".into())
        );
    }

    #[tokio::test]
    async fn test_custom_collection_name_and_clear() {
        let (coordinator, store) = coordinator(HistoryConfig::default().with_collection_name("audit"));

        coordinator
            .record("users", Mutation::Insert { document: doc(json!({"_id": 1})) })
            .await
            .unwrap();
        assert_eq!(coordinator.history_collection("users").name(), "audit");
        assert_eq!(store.records("audit").len(), 1);

        coordinator.clear_history("users").await.unwrap();
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HistoryConfig::default().with_metadata(MetadataDescriptor::field("d", "x"));
        let err = MutationCoordinator::new(&config, Arc::new(MemoryHistoryStore::new())).unwrap_err();
        assert_eq!(err.code(), "AERO_HISTORY_INVALID_CONFIG");
    }
}

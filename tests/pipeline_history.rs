//! Pipeline integration: every mutation routed through the operation
//! pipeline leaves one durable, checksummed history record.

use std::sync::Arc;

use aerodb_history::core::{
    DeleteOp, HistoryMiddleware, InMemoryStorage, Operation, Pipeline, ReadOp, ReplaceOp,
    RequestContext, StorageBackend, UnifiedExecutor, UpdateOp, WriteOp,
};
use aerodb_history::history::{
    FileHistoryStore, HistoryConfig, MemoryHistoryStore, MetadataDescriptor, OperationCode,
};
use serde_json::{json, Value};
use tempfile::tempdir;

async fn run(pipeline: &Pipeline, op: Operation) -> Value {
    pipeline.execute(op, RequestContext::new()).await.unwrap()
}

#[tokio::test]
async fn test_document_lifecycle_is_recorded_in_order() {
    let dir = tempdir().unwrap();
    let history = Arc::new(FileHistoryStore::open(dir.path()).await.unwrap());
    let storage = Arc::new(InMemoryStorage::new());

    let config = HistoryConfig::default()
        .diff_only(true)
        .with_metadata(MetadataDescriptor::field("actor", "editor"));
    let middleware = HistoryMiddleware::new(&config, history.clone(), storage.clone()).unwrap();
    let pipeline = Pipeline::new(UnifiedExecutor::shared(storage.clone())).with_middleware(middleware);

    let created = run(
        &pipeline,
        Operation::Write(WriteOp {
            collection: "articles".to_string(),
            document: json!({"title": "draft", "body": "…", "editor": "ana"}),
        }),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    run(
        &pipeline,
        Operation::Replace(ReplaceOp {
            collection: "articles".to_string(),
            id: id.clone(),
            document: json!({"title": "final", "body": "…", "editor": "ben"}),
        }),
    )
    .await;

    run(
        &pipeline,
        Operation::Update(UpdateOp {
            collection: "articles".to_string(),
            id: id.clone(),
            updates: json!({"$set": {"published": true}}),
        }),
    )
    .await;

    run(
        &pipeline,
        Operation::Delete(DeleteOp {
            collection: "articles".to_string(),
            id: id.clone(),
        }),
    )
    .await;

    let records = history.verify("articles_history").await.unwrap();
    let operations: Vec<_> = records.iter().map(|r| r.operation()).collect();
    assert_eq!(
        operations,
        vec![
            OperationCode::Insert,
            OperationCode::Update,
            OperationCode::Update,
            OperationCode::Remove
        ]
    );

    assert_eq!(records[0].payload()["_id"], json!(id));
    assert_eq!(records[0].get("actor"), Some(&json!("ana")));

    let diff = Value::Object(records[1].payload().clone());
    assert_eq!(diff, json!({"_id": id, "title": "final", "editor": "ben"}));
    assert_eq!(records[1].get("actor"), Some(&json!("ben")));

    assert_eq!(Value::Object(records[2].payload().clone()), json!({"published": true}));
    assert_eq!(records[2].get("actor"), Some(&Value::Null));

    assert_eq!(records[3].payload()["title"], "final");
    assert_eq!(records[3].payload()["published"], true);
}

#[tokio::test]
async fn test_failed_history_leaves_storage_untouched() {
    let storage = Arc::new(InMemoryStorage::new());
    let history = Arc::new(MemoryHistoryStore::new());
    storage.write("users", json!({"_id": "u1", "name": "a"})).unwrap();

    let config = HistoryConfig::default().with_metadata(MetadataDescriptor::derive_async(
        "approved_by",
        |_, _| async { Err::<Value, _>("approval service unavailable".to_string()) },
    ));
    let middleware = HistoryMiddleware::new(&config, history.clone(), storage.clone()).unwrap();
    let pipeline = Pipeline::new(UnifiedExecutor::shared(storage.clone())).with_middleware(middleware);

    let err = pipeline
        .execute(
            Operation::Update(UpdateOp {
                collection: "users".to_string(),
                id: "u1".to_string(),
                updates: json!({"name": "b"}),
            }),
            RequestContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AERO_HISTORY_METADATA_FAILED");

    let current = pipeline
        .execute(
            Operation::Read(ReadOp {
                collection: "users".to_string(),
                id: "u1".to_string(),
            }),
            RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(current["name"], "a");
    assert_eq!(history.total(), 0);
}

#[tokio::test]
async fn test_custom_collection_name_collects_all_sources() {
    let storage = Arc::new(InMemoryStorage::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let config = HistoryConfig::default().with_collection_name("audit_log");
    let middleware = HistoryMiddleware::new(&config, history.clone(), storage.clone()).unwrap();
    let pipeline = Pipeline::new(UnifiedExecutor::shared(storage.clone())).with_middleware(middleware);

    for collection in ["users", "orders"] {
        run(
            &pipeline,
            Operation::Write(WriteOp {
                collection: collection.to_string(),
                document: json!({"n": 1}),
            }),
        )
        .await;
    }

    assert_eq!(history.records("audit_log").len(), 2);
    assert!(history.records("users_history").is_empty());
}

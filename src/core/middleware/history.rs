//! History Middleware
//!
//! Records a history entry for every mutation before it reaches the
//! executor. If the entry cannot be recorded the operation is aborted, so a
//! mutation never completes without its audit record.
//!
//! | Operation | Recorded as                                   |
//! |-----------|-----------------------------------------------|
//! | Write     | insert snapshot (an `_id` is assigned first)  |
//! | Replace   | save, prior state re-fetched from storage     |
//! | Update    | bulk update with the change set               |
//! | Delete    | remove snapshot of the stored document        |
//!
//! Mutations the executor is bound to reject are passed through unrecorded:
//! changes to documents that do not exist, and writes whose identifier is
//! already stored.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::Middleware;
use crate::core::context::RequestContext;
use crate::core::error::{CoreError, CoreResult};
use crate::core::executor::{id_string, StorageBackend};
use crate::core::operation::{Operation, WriteOp};
use crate::core::pipeline::{Next, OperationResult};
use crate::history::{
    into_document, BoxFuture, Document, HistoryConfig, HistoryResult, HistoryStore, Mutation,
    MutationCoordinator, SnapshotSource,
};
use crate::observability::Event;

/// Context key holding the operation code of the recorded entry
pub const HISTORY_OPERATION_KEY: &str = "history_operation";

/// Reads prior snapshots from a pipeline storage backend
pub struct StorageSnapshotSource {
    storage: Arc<dyn StorageBackend>,
}

impl StorageSnapshotSource {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

impl SnapshotSource for StorageSnapshotSource {
    fn find_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a Value,
    ) -> BoxFuture<'a, Result<Option<Document>, String>> {
        Box::pin(async move {
            match self.storage.read(collection, &id_string(id))? {
                Some(stored) => into_document(stored).map(Some).map_err(|e| e.to_string()),
                None => Ok(None),
            }
        })
    }
}

/// What the middleware does for one operation
struct Plan {
    mutation: Option<Mutation>,
    rewritten: Option<Operation>,
}

impl Plan {
    fn pass_through() -> Self {
        Self {
            mutation: None,
            rewritten: None,
        }
    }

    fn record(mutation: Mutation) -> Self {
        Self {
            mutation: Some(mutation),
            rewritten: None,
        }
    }
}

/// Middleware that records history for mutations
pub struct HistoryMiddleware {
    coordinator: Arc<MutationCoordinator>,
    storage: Arc<dyn StorageBackend>,
    tracked: Option<HashSet<String>>,
}

impl HistoryMiddleware {
    /// Create a middleware recording into `history`.
    ///
    /// Prior snapshots for full saves are re-fetched from `storage`, which
    /// must be the storage the executor writes to.
    pub fn new(
        config: &HistoryConfig,
        history: Arc<dyn HistoryStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> HistoryResult<Self> {
        let snapshots = Arc::new(StorageSnapshotSource::new(Arc::clone(&storage)));
        let coordinator = MutationCoordinator::new(config, history)?.with_snapshot_source(snapshots);

        Ok(Self {
            coordinator: Arc::new(coordinator),
            storage,
            tracked: None,
        })
    }

    /// Only record history for the given collections
    pub fn only<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.coordinator
    }

    fn is_tracked(&self, collection: &str) -> bool {
        self.tracked
            .as_ref()
            .map(|tracked| tracked.contains(collection))
            .unwrap_or(true)
    }

    fn stored(&self, collection: &str, id: &str) -> CoreResult<Option<Value>> {
        self.storage.read(collection, id).map_err(CoreError::execution)
    }

    fn plan(&self, op: &Operation) -> CoreResult<Plan> {
        let id_field = self.coordinator.id_field();

        let plan = match op {
            Operation::Read(_) => Plan::pass_through(),
            Operation::Write(write) => {
                let mut document = as_document(&write.document)?;
                match document.get(id_field).map(id_string) {
                    // The executor rejects the duplicate; nothing is created.
                    Some(id) if self.stored(&write.collection, &id)?.is_some() => {
                        return Ok(Plan::pass_through());
                    }
                    Some(_) => {}
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        document.insert(id_field.to_string(), Value::String(id));
                    }
                }
                Plan {
                    rewritten: Some(Operation::Write(WriteOp {
                        collection: write.collection.clone(),
                        document: Value::Object(document.clone()),
                    })),
                    mutation: Some(Mutation::Insert { document }),
                }
            }
            Operation::Replace(replace) => {
                let Some(stored) = self.stored(&replace.collection, &replace.id)? else {
                    return Ok(Plan::pass_through());
                };
                // A full save keeps the stored identifier, whatever the new body says.
                let id = stored
                    .get(id_field)
                    .cloned()
                    .unwrap_or_else(|| Value::String(replace.id.clone()));
                let mut current = as_document(&replace.document)?;
                current.insert(id_field.to_string(), id);
                Plan::record(Mutation::Save {
                    original: None,
                    current,
                })
            }
            Operation::Update(update) => {
                if self.stored(&update.collection, &update.id)?.is_none() {
                    return Ok(Plan::pass_through());
                }
                Plan::record(Mutation::BulkUpdate {
                    update: as_document(&update.updates)?,
                })
            }
            Operation::Delete(delete) => match self.stored(&delete.collection, &delete.id)? {
                Some(stored) => Plan::record(Mutation::Remove {
                    document: as_document(&stored)?,
                }),
                None => Plan::pass_through(),
            },
        };

        Ok(plan)
    }
}

fn as_document(value: &Value) -> CoreResult<Document> {
    into_document(value.clone()).map_err(|e| CoreError::validation(e.to_string()))
}

impl Middleware for HistoryMiddleware {
    fn process<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> Pin<Box<dyn Future<Output = OperationResult> + Send + 'a>> {
        Box::pin(async move {
            if !op.is_mutation() || !self.is_tracked(op.collection()) {
                return next.run(op, ctx).await;
            }

            let plan = self.plan(op)?;

            if let Some(mutation) = plan.mutation {
                match self.coordinator.record(op.collection(), mutation).await {
                    Ok(record) => {
                        ctx.metadata.insert(
                            HISTORY_OPERATION_KEY.to_string(),
                            Value::from(record.operation().as_str()),
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            event = %Event::MutationAborted,
                            request_id = %ctx.request_id,
                            collection = op.collection(),
                            operation = op.name(),
                            code = e.code(),
                            error = %e,
                            "mutation aborted"
                        );
                        return Err(CoreError::History(e));
                    }
                }
            }

            match plan.rewritten {
                Some(rewritten) => next.run(&rewritten, ctx).await,
                None => next.run(op, ctx).await,
            }
        })
    }
}

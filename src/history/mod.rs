//! # History
//!
//! Change auditing for document collections. Every mutation of a tracked
//! collection produces one history record in a parallel collection named
//! `<source>_history` (or a configured custom name).
//!
//! # Components
//!
//! - [`equality`]: structural deep equality of JSON values
//! - [`diff`]: sparse field-level change sets, with an optional custom diff
//! - [`metadata`]: extra record fields derived from before/after snapshots
//! - [`record`]: the persisted `{t, o, d, ...metadata}` entity
//! - [`coordinator`]: drives one mutation through diff, build, enrich and save
//! - [`store`] / [`file_store`]: history persistence
//!
//! # Guarantees
//!
//! - A record is saved only after its metadata fully resolved
//! - No partial record is ever persisted
//! - The version marker never appears in a payload
//! - Diff payloads always carry the identifier field

pub mod config;
pub mod coordinator;
pub mod diff;
pub mod equality;
pub mod errors;
pub mod file_store;
pub mod metadata;
pub mod record;
pub mod store;

pub use config::{history_collection_name, HistoryConfig, HistoryOptions, HISTORY_SUFFIX};
pub use coordinator::{update_payload, Mutation, MutationCoordinator};
pub use diff::{CustomDiff, DiffEngine, FieldDiff};
pub use equality::values_equal;
pub use errors::{HistoryError, HistoryResult};
pub use file_store::FileHistoryStore;
pub use metadata::{BoxFuture, MetadataDescriptor, MetadataEnricher, MetadataSource};
pub use record::{into_document, Document, HistoryRecord, OperationCode, RESERVED_FIELDS};
pub use store::{HistoryCollection, HistoryStore, MemoryHistoryStore, NoSnapshotSource, SnapshotSource};

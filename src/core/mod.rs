//! # Core Module
//!
//! Unified operation model and middleware pipeline. Every data operation
//! routes through this module, which is where history is intercepted.
//!
//! ## Design Principles
//!
//! - Single unified operation model for all requests
//! - Middleware-based execution pipeline
//! - History recorded before the mutation reaches storage

pub mod context;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod operation;
pub mod pipeline;

pub use context::RequestContext;
pub use error::{CoreError, CoreResult};
pub use executor::{id_string, InMemoryStorage, StorageBackend, UnifiedExecutor};
pub use middleware::history::{HistoryMiddleware, StorageSnapshotSource, HISTORY_OPERATION_KEY};
pub use middleware::Middleware;
pub use operation::{DeleteOp, Operation, ReadOp, ReplaceOp, UpdateOp, WriteOp};
pub use pipeline::{Next, OperationExecutor, OperationResult, Pipeline};

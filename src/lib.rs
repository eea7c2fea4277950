//! aerodb-history - change auditing for AeroDB collections
//!
//! Every mutation of a tracked collection is recorded as an immutable
//! history entry `{t, o, d, ...metadata}` in a parallel history collection.
//!
//! - [`history`]: equality, diffing, record building, metadata, stores
//! - [`core`]: the operation pipeline and its history middleware
//! - [`observability`]: structured logging
//! - [`cli`]: maintenance commands for file-backed history

pub mod cli;
pub mod core;
pub mod history;
pub mod observability;

//! Core Error Types
//!
//! Unified error handling for the execution pipeline.

use thiserror::Error;

use crate::history::HistoryError;

/// Core module result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// The mutation was aborted because its history could not be recorded
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

impl CoreError {
    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Get error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Execution(_) => "EXECUTION_ERROR",
            Self::History(e) => e.code(),
        }
    }
}

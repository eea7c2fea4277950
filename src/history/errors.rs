//! # History Errors
//!
//! Error codes:
//! - AERO_HISTORY_METADATA_FAILED
//! - AERO_HISTORY_STORE_FAILED
//! - AERO_HISTORY_SNAPSHOT_FETCH_FAILED
//! - AERO_HISTORY_TIMEOUT
//! - AERO_HISTORY_INVALID_CONFIG
//! - AERO_HISTORY_INVALID_DOCUMENT
//!
//! A snapshot that cannot be resolved is not an error:
//! the coordinator falls back to a self baseline and logs a warning instead.

use thiserror::Error;

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// History errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// An asynchronous metadata derivation reported an error
    #[error("Metadata derivation for '{key}' failed: {reason}")]
    MetadataFailed { key: String, reason: String },

    /// The history store rejected the save or clear
    #[error("History store failed: {0}")]
    StoreFailed(String),

    /// Re-fetching the prior snapshot failed
    #[error("Snapshot re-fetch failed: {0}")]
    SnapshotFetchFailed(String),

    /// A configured timeout elapsed
    #[error("Timed out during {stage}")]
    Timeout { stage: String },

    /// Configuration rejected during validation
    #[error("Invalid history configuration: {0}")]
    InvalidConfig(String),

    /// A mutation carried something other than a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl HistoryError {
    /// Returns the error code
    pub fn code(&self) -> &'static str {
        match self {
            HistoryError::MetadataFailed { .. } => "AERO_HISTORY_METADATA_FAILED",
            HistoryError::StoreFailed(_) => "AERO_HISTORY_STORE_FAILED",
            HistoryError::SnapshotFetchFailed(_) => "AERO_HISTORY_SNAPSHOT_FETCH_FAILED",
            HistoryError::Timeout { .. } => "AERO_HISTORY_TIMEOUT",
            HistoryError::InvalidConfig(_) => "AERO_HISTORY_INVALID_CONFIG",
            HistoryError::InvalidDocument(_) => "AERO_HISTORY_INVALID_DOCUMENT",
        }
    }

    /// Create a metadata failure for the given descriptor key
    pub fn metadata_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        HistoryError::MetadataFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error for a pipeline stage
    pub fn timeout(stage: impl Into<String>) -> Self {
        HistoryError::Timeout {
            stage: stage.into(),
        }
    }

    /// Whether the missing history record should be escalated to an operator.
    ///
    /// Configuration errors surface at startup, everything else means a
    /// mutation went through the pipeline without an audit record.
    pub fn requires_operator_attention(&self) -> bool {
        !matches!(self, HistoryError::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            HistoryError::metadata_failed("actor", "boom").code(),
            "AERO_HISTORY_METADATA_FAILED"
        );
        assert_eq!(
            HistoryError::StoreFailed("disk full".into()).code(),
            "AERO_HISTORY_STORE_FAILED"
        );
        assert_eq!(HistoryError::timeout("save").code(), "AERO_HISTORY_TIMEOUT");
    }

    #[test]
    fn test_metadata_error_display_names_key() {
        let err = HistoryError::metadata_failed("actor", "lookup failed");
        let display = err.to_string();
        assert!(display.contains("actor"));
        assert!(display.contains("lookup failed"));
    }

    #[test]
    fn test_operator_attention() {
        assert!(HistoryError::StoreFailed("x".into()).requires_operator_attention());
        assert!(!HistoryError::InvalidConfig("x".into()).requires_operator_attention());
    }
}

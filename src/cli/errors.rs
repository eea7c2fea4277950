//! CLI-specific error types
//!
//! All CLI errors are fatal: the process exits non-zero.

use std::io;

use thiserror::Error;

use crate::history::HistoryError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file error
    #[error("{0}")]
    Config(String),

    /// I/O error (stdout, runtime)
    #[error("{0}")]
    Io(#[from] io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// History store or configuration error
    #[error("{0}")]
    History(#[from] HistoryError),
}

impl CliError {
    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "AERO_CLI_CONFIG_ERROR",
            Self::Io(_) | Self::Json(_) => "AERO_CLI_IO_ERROR",
            Self::History(e) => e.code(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

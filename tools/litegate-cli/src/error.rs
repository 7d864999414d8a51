//! CLI Error Types
//!
//! Error messages with hints for the common operator mistakes.

use std::fmt;
use std::path::PathBuf;

use litegate_client::ClientError;
use litegate_core::{GateError, StoreError};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific errors with helpful messages and hints
#[derive(Debug, Error)]
pub enum CliError {
    /// The database file could not be opened or prepared
    #[error("Cannot open database {}\n  Reason: {source}", .path.display())]
    OpenStore {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    /// Protection triggers are missing after setup
    #[error("REMOTE_ACCESS_KEYS in {} is not protected\n  Hint: Check that the file is writable and not opened read-only", .path.display())]
    Unprotected { path: PathBuf },

    /// Invalid JSON provided as input
    #[error("Invalid JSON value: {input}\n  Error: {error}\n  Hint: Use single quotes around JSON: --arg '\"text\"'")]
    InvalidJson { input: String, error: String },

    /// A `--param` without `NAME=`
    #[error("Invalid parameter: {input}\n  Hint: Use NAME=JSON, for example --param id=42")]
    InvalidParam { input: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Server(#[from] GateError),

    #[error("{0}")]
    Client(#[from] ClientError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an open store error
    pub fn open_store(path: impl Into<PathBuf>, source: StoreError) -> Self {
        Self::OpenStore {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid JSON error
    pub fn invalid_json(input: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::InvalidJson {
            input: input.into(),
            error: error.to_string(),
        }
    }
}

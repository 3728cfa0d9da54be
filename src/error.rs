//! Application error types.

use thiserror::Error;

/// Application-level errors for rehome.
#[derive(Error, Debug)]
pub enum AppError {
    // Store errors
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store operation '{op}' failed at {path}: {message}")]
    Store {
        op: &'static str,
        path: String,
        message: String,
    },

    #[error("Query on '{collection}' failed: {message}")]
    Query { collection: String, message: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    // Run errors
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Run aborted by operator before any write")]
    Aborted,

    #[error("Run interrupted by operator; re-run to resume")]
    Interrupted,

    // Snapshot errors
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot format error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a [`AppError::Store`] for a failed point operation.
    pub fn store(op: &'static str, path: impl ToString, message: impl ToString) -> Self {
        Self::Store {
            op,
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

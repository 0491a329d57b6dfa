//! Centralized error types for iFlow ingestion.

use thiserror::Error;

/// Main error type for parsing, assembly and export.
#[derive(Error, Debug)]
pub enum IflowError {
    #[error("Malformed iFlow document '{path}': {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("Connection '{connection}' references unresolvable endpoint '{endpoint}'")]
    UnresolvedEndpoint { connection: String, endpoint: String },

    #[error("Invalid graph export: {0}")]
    InvalidExport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for iFlow operations.
pub type IflowResult<T> = Result<T, IflowError>;

impl IflowError {
    /// Create a malformed document error.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid export error.
    pub fn invalid_export(msg: impl Into<String>) -> Self {
        Self::InvalidExport(msg.into())
    }
}

//! Error types for GitDB
//!
//! Provides a unified error type for all operations.

use std::path::Path;

use thiserror::Error;

/// Result type alias using GitDbError
pub type Result<T> = std::result::Result<T, GitDbError>;

/// Unified error type for GitDB operations
#[derive(Debug, Error)]
pub enum GitDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    #[error("Invalid record id: {0}")]
    Format(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Encoding Errors
    // -------------------------------------------------------------------------
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    // -------------------------------------------------------------------------
    // Model Errors
    // -------------------------------------------------------------------------
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No model registered for dataset: {0}")]
    UnregisteredDataset(String),

    // -------------------------------------------------------------------------
    // Version Control Errors
    // -------------------------------------------------------------------------
    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Setup error: {0}")]
    Setup(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GitDbError {
    /// Wrap a JSON decode failure with the file it came from
    pub(crate) fn parse_at(path: &Path, err: serde_json::Error) -> Self {
        GitDbError::Parse(format!("{}: {}", path.display(), err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GitDbError::NotFound(_))
    }
}

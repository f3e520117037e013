//! Error types for the record store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
///
/// Lookups, updates and deletes on missing keys are not errors; they report
/// through `Option`/`bool` returns. This type only covers I/O and encoding.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error in {path}: {message}")]
    Deserialization { path: PathBuf, message: String },

    #[error("Invalid record: expected a JSON object, got {0}")]
    InvalidRecord(&'static str),

    #[error("Store has no backing file")]
    NotPersistent,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

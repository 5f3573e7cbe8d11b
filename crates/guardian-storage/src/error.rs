use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error in column '{column}', key '{key}': {reason}")]
    Deserialization {
        column: String,
        key: String,
        reason: String,
    },

    #[error("Corrupt database file: {0}")]
    Corrupt(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

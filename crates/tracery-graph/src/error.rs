//! Error types for the graph crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reading or writing the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Input rejected before touching storage.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested node or edge endpoint does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A node with the same id or dedup key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock acquisition or the transaction deadline expired.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Stored data could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl GraphError {
    /// Whether the error aborts a whole batch rather than one candidate.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Io(_)
                | Self::Timeout(_)
                | Self::Cancelled
                | Self::InvalidData(_)
        )
    }
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        assert!(GraphError::Cancelled.is_storage());
        assert!(GraphError::Timeout(Duration::from_millis(5)).is_storage());
        assert!(!GraphError::Validation("empty".into()).is_storage());
        assert!(!GraphError::NotFound("n1".into()).is_storage());
        assert!(!GraphError::Conflict("n1".into()).is_storage());
    }
}

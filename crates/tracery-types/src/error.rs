//! Error types for parsing the shared data model.

use thiserror::Error;

/// Result type alias using the types error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or validating model values.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Unknown relationship type: {0}")]
    UnknownRelationship(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),
}

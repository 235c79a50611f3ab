//! Error types for the extract crate.

use thiserror::Error;
use tracery_types::NodeType;

/// Errors raised while building a pattern table.
///
/// Extraction itself never fails; only table construction does.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A trigger pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A trigger pattern matches the empty string.
    #[error("pattern '{0}' matches empty text")]
    EmptyMatch(String),

    /// The category cannot be produced by extraction.
    #[error("node type {0} cannot be an extraction category")]
    InvalidCategory(NodeType),

    /// Weight outside [0, 1].
    #[error("weight {weight} for pattern '{pattern}' is out of range [0.0, 1.0]")]
    InvalidWeight { pattern: String, weight: f64 },
}

/// Result type alias for extract operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

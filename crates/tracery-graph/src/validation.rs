//! Validation of nodes, edges and ingestion input.
//!
//! Validation runs before anything reaches a backend, so a failure never
//! leaves partial state behind.

use tracery_types::{Edge, Node};

use crate::error::{GraphError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty or whitespace only.
    #[error("content is empty")]
    EmptyContent,

    /// Content contains NUL bytes.
    #[error("content contains NUL bytes")]
    NulBytes,

    /// Confidence outside [0.0, 1.0].
    #[error("confidence {0} is out of range [0.0, 1.0]")]
    InvalidConfidence(f64),

    /// Identifier is empty.
    #[error("{0} id is empty")]
    EmptyId(&'static str),

    /// Session id is empty.
    #[error("session ID is empty")]
    EmptySessionId,

    /// Edge points back at its own source.
    #[error("{relationship} edge from '{node_id}' to itself is not allowed")]
    SelfLoop {
        node_id: String,
        relationship: String,
    },
}

impl From<ValidationError> for GraphError {
    fn from(err: ValidationError) -> Self {
        GraphError::Validation(err.to_string())
    }
}

type ValidationResult = std::result::Result<(), ValidationError>;

// ─────────────────────────────────────────────────────────────────────────────
// Scalars
// ─────────────────────────────────────────────────────────────────────────────

/// Validate a confidence score is in the valid range [0.0, 1.0].
pub fn validate_confidence(score: f64) -> ValidationResult {
    if !(0.0..=1.0).contains(&score) || score.is_nan() {
        return Err(ValidationError::InvalidConfidence(score));
    }
    Ok(())
}

/// Validate node or candidate content.
pub fn validate_content(content: &str) -> ValidationResult {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if content.contains('\0') {
        return Err(ValidationError::NulBytes);
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> ValidationResult {
    if session_id.trim().is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph elements
// ─────────────────────────────────────────────────────────────────────────────

/// Validate a node before it is written.
pub fn validate_node(node: &Node) -> ValidationResult {
    if node.id.trim().is_empty() {
        return Err(ValidationError::EmptyId("node"));
    }
    validate_content(&node.content)?;
    validate_confidence(node.confidence)?;
    Ok(())
}

/// Validate an edge before it is written. Endpoint existence is checked by
/// the writer.
pub fn validate_edge(edge: &Edge) -> ValidationResult {
    if edge.id.trim().is_empty() {
        return Err(ValidationError::EmptyId("edge"));
    }
    if edge.source_node_id.is_empty() {
        return Err(ValidationError::EmptyId("source node"));
    }
    if edge.target_node_id.is_empty() {
        return Err(ValidationError::EmptyId("target node"));
    }
    if edge.is_self_loop() && !edge.relationship_type.allows_self_reference() {
        return Err(ValidationError::SelfLoop {
            node_id: edge.source_node_id.clone(),
            relationship: edge.relationship_type.to_string(),
        });
    }
    validate_confidence(edge.confidence)?;
    Ok(())
}

/// Validate a node, converting to [`GraphError`].
pub fn validate_node_result(node: &Node) -> Result<()> {
    validate_node(node).map_err(GraphError::from)
}

/// Validate an edge, converting to [`GraphError`].
pub fn validate_edge_result(edge: &Edge) -> Result<()> {
    validate_edge(edge).map_err(GraphError::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

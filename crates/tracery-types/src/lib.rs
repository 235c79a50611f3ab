//! Shared types for the Tracery knowledge graph.
//!
//! Nodes and edges are the two persisted collections. Ingestion requests and
//! the exported [`NodeRecord`] shape are the contracts with the collaborators
//! that feed and read the graph.

pub mod edge;
pub mod error;
pub mod ingest;
pub mod node;
pub mod record;

use chrono::{DateTime, Utc};

pub use edge::{Direction, Edge, EdgeId, RelationshipType};
pub use error::{Error, Result};
pub use ingest::{Attribution, IngestContext, IngestRequest};
pub use node::{Node, NodeId, NodeType, Properties, derive_title, props};
pub use record::{EdgeRef, NodeRecord};

/// Timestamp type used throughout the graph.
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh opaque identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time.
pub fn now() -> Timestamp {
    Utc::now()
}

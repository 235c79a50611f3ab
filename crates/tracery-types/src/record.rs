//! Structured records exposed to reporting collaborators.

use serde::{Deserialize, Serialize};

use crate::edge::{Edge, RelationshipType};
use crate::node::{Node, NodeId, NodeType};
use crate::Timestamp;

/// Outbound edge summary attached to a [`NodeRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub target_id: NodeId,
}

impl From<&Edge> for EdgeRef {
    fn from(edge: &Edge) -> Self {
        Self {
            relationship_type: edge.relationship_type,
            target_id: edge.target_node_id.clone(),
        }
    }
}

/// A node as returned from queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    pub content: String,
    pub confidence: f64,
    pub importance: f64,
    pub created_at: Timestamp,
    pub edges: Vec<EdgeRef>,
}

impl NodeRecord {
    /// Build a record from a node and its outbound edges.
    pub fn from_node<'a>(node: &Node, outbound: impl IntoIterator<Item = &'a Edge>) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type,
            title: node.title.clone(),
            content: node.content.clone(),
            confidence: node.confidence,
            importance: node.importance(),
            created_at: node.created_at,
            edges: outbound.into_iter().map(EdgeRef::from).collect(),
        }
    }
}

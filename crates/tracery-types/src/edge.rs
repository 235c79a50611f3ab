//! Graph edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, Properties};
use crate::{Error, Timestamp, new_id, now};

/// Opaque edge identifier.
pub type EdgeId = String;

/// Relationship types supported in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Entity was first observed in a session.
    WasDiscussedIn,
    /// Entity was informed by an earlier entity.
    WasInformedBy,
    /// Entity is a consequence of another (action item of a decision).
    ResultsFrom,
    /// Entity implies a change to an artifact.
    Modifies,
    /// Entity mentions an artifact without implying change.
    References,
    /// Entity was produced by an agent.
    PerformedBy,
    /// Session ordering.
    Follows,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        Self::WasDiscussedIn,
        Self::WasInformedBy,
        Self::ResultsFrom,
        Self::Modifies,
        Self::References,
        Self::PerformedBy,
        Self::Follows,
    ];

    /// Get the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WasDiscussedIn => "WAS_DISCUSSED_IN",
            Self::WasInformedBy => "WAS_INFORMED_BY",
            Self::ResultsFrom => "RESULTS_FROM",
            Self::Modifies => "MODIFIES",
            Self::References => "REFERENCES",
            Self::PerformedBy => "PERFORMED_BY",
            Self::Follows => "FOLLOWS",
        }
    }

    /// Parse the stored string representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|r| r.as_str() == upper)
    }

    /// Whether an edge of this type may point back at its own source.
    pub fn allows_self_reference(&self) -> bool {
        false
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::UnknownRelationship(s.to_string()))
    }
}

/// Which side of a node an adjacency lookup follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose source is the node.
    #[default]
    Outgoing,
    /// Edges whose target is the node.
    Incoming,
    /// Either side.
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outgoing" | "out" => Ok(Self::Outgoing),
            "incoming" | "in" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            _ => Err(Error::UnknownDirection(s.to_string())),
        }
    }
}

/// A typed, directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier.
    pub id: EdgeId,
    /// Source node id.
    pub source_node_id: NodeId,
    /// Target node id.
    pub target_node_id: NodeId,
    /// Relationship type.
    pub relationship_type: RelationshipType,
    /// Relationship metadata.
    #[serde(default)]
    pub properties: Properties,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// When the edge was created.
    pub created_at: Timestamp,
}

impl Edge {
    /// Create a new edge with a fresh id.
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            id: new_id(),
            source_node_id: source.into(),
            target_node_id: target.into(),
            relationship_type,
            properties: Properties::new(),
            confidence: 1.0,
            created_at: now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Add a property to the edge.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The node on the other side of `node_id`, if the edge touches it.
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_node_id == node_id {
            Some(&self.target_node_id)
        } else if self.target_node_id == node_id {
            Some(&self.source_node_id)
        } else {
            None
        }
    }

    /// Whether the edge points from a node back to itself.
    pub fn is_self_loop(&self) -> bool {
        self.source_node_id == self.target_node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_as_str() {
        assert_eq!(RelationshipType::WasDiscussedIn.as_str(), "WAS_DISCUSSED_IN");
        assert_eq!(RelationshipType::WasInformedBy.as_str(), "WAS_INFORMED_BY");
        assert_eq!(RelationshipType::ResultsFrom.as_str(), "RESULTS_FROM");
        assert_eq!(RelationshipType::PerformedBy.as_str(), "PERFORMED_BY");
    }

    #[test]
    fn test_relationship_type_parse() {
        for rel in RelationshipType::ALL {
            assert_eq!(RelationshipType::parse(rel.as_str()), Some(rel));
        }
        assert_eq!(
            RelationshipType::parse("was informed by"),
            Some(RelationshipType::WasInformedBy)
        );
        assert!(RelationshipType::parse("LIKES").is_none());
    }

    #[test]
    fn test_serde_matches_storage_form() {
        let json = serde_json::to_string(&RelationshipType::WasDiscussedIn).unwrap();
        assert_eq!(json, "\"WAS_DISCUSSED_IN\"");
    }

    #[test]
    fn test_no_self_reference_by_default() {
        assert!(
            RelationshipType::ALL
                .iter()
                .all(|r| !r.allows_self_reference())
        );
    }

    #[test]
    fn test_other_end() {
        let edge = Edge::new("a", "b", RelationshipType::References);
        assert_eq!(edge.other_end("a"), Some("b"));
        assert_eq!(edge.other_end("b"), Some("a"));
        assert_eq!(edge.other_end("c"), None);
        assert!(!edge.is_self_loop());
        assert!(Edge::new("a", "a", RelationshipType::Follows).is_self_loop());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("BOTH".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }
}

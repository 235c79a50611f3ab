//! Graph nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Timestamp, new_id, now};

/// Opaque node identifier.
pub type NodeId = String;

/// Open key/value metadata attached to nodes and edges.
///
/// Ordered so that serialized output is stable.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Well-known property keys.
pub mod props {
    /// Importance score assigned at ingestion (f64 in [0, 1]).
    pub const IMPORTANCE: &str = "importance";
    /// Base weight of the extraction rule that produced the node.
    pub const CATEGORY_WEIGHT: &str = "category_weight";
    /// Label of the trigger pattern that matched.
    pub const TRIGGER: &str = "trigger";
    /// Session in which the node was first observed.
    pub const SESSION_ID: &str = "session_id";
    /// Path carried by `File` nodes.
    pub const FILE_PATH: &str = "file_path";
    /// Archive flag; archived nodes are hidden from keyword search.
    pub const ARCHIVED: &str = "archived";
    /// Opaque attribution tag: user.
    pub const USER_ID: &str = "user_id";
    /// Opaque attribution tag: channel.
    pub const CHANNEL_ID: &str = "channel_id";
    /// Ordinal of the node within its ingestion batch.
    pub const INGEST_SEQ: &str = "ingest_seq";
    /// Why an edge was created.
    pub const REASON: &str = "reason";
    /// Similarity score recorded on inferred edges.
    pub const SIMILARITY: &str = "similarity";
}

/// Maximum title length before truncation.
const TITLE_MAX_CHARS: usize = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Node Type
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Insight,
    Decision,
    ActionItem,
    File,
    Session,
    Test,
    Agent,
}

impl NodeType {
    /// All node types, in declaration order.
    pub const ALL: [NodeType; 7] = [
        Self::Insight,
        Self::Decision,
        Self::ActionItem,
        Self::File,
        Self::Session,
        Self::Test,
        Self::Agent,
    ];

    /// Types produced by extraction that carry conversational knowledge.
    pub const KNOWLEDGE: [NodeType; 3] = [Self::Insight, Self::Decision, Self::ActionItem];

    /// Stable string form, used for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insight => "Insight",
            Self::Decision => "Decision",
            Self::ActionItem => "ActionItem",
            Self::File => "File",
            Self::Session => "Session",
            Self::Test => "Test",
            Self::Agent => "Agent",
        }
    }

    /// Parse from a stored or user-supplied string (case-insensitive,
    /// accepts `action_item` and `action-item`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "insight" => Some(Self::Insight),
            "decision" => Some(Self::Decision),
            "actionitem" => Some(Self::ActionItem),
            "file" => Some(Self::File),
            "session" => Some(Self::Session),
            "test" => Some(Self::Test),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }

    /// Whether this is an Insight, Decision or ActionItem.
    pub fn is_knowledge(&self) -> bool {
        Self::KNOWLEDGE.contains(self)
    }

    /// Whether nodes of this type must carry a `WAS_DISCUSSED_IN` edge.
    pub fn requires_provenance(&self) -> bool {
        self.is_knowledge() || *self == Self::Test
    }

    /// Whether the relationship builder may create placeholders of this type
    /// to satisfy a dangling edge.
    pub fn is_auto_created(&self) -> bool {
        matches!(self, Self::File | Self::Session)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::UnknownNodeType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// A typed entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique identifier.
    pub id: NodeId,
    /// Entity kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Short display title.
    pub title: String,
    /// Full text content.
    pub content: String,
    /// Type-specific metadata.
    #[serde(default)]
    pub properties: Properties,
    /// When the node was first observed.
    pub created_at: Timestamp,
    /// Conversation the node was extracted from (lookup only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_conversation_id: Option<String>,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
}

impl Node {
    /// Create a node with a fresh id and a title derived from the content.
    pub fn new(node_type: NodeType, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: new_id(),
            node_type,
            title: derive_title(&content),
            content,
            properties: Properties::new(),
            created_at: now(),
            source_conversation_id: None,
            confidence: 0.5,
        }
    }

    /// The node representing a conversation session.
    pub fn session(session_id: &str) -> Self {
        Self {
            id: Self::session_id_for(session_id),
            node_type: NodeType::Session,
            title: format!("Session {}", session_id),
            content: format!("Session {}", session_id),
            properties: Properties::from([(
                props::SESSION_ID.to_string(),
                serde_json::Value::from(session_id),
            )]),
            created_at: now(),
            source_conversation_id: None,
            confidence: 0.9,
        }
    }

    /// The node representing a file path.
    pub fn file(path: &str) -> Self {
        let normalized = normalize_path(path);
        let title = normalized
            .rsplit('/')
            .next()
            .unwrap_or(normalized.as_str())
            .to_string();
        Self {
            id: Self::file_id_for(&normalized),
            node_type: NodeType::File,
            title,
            content: normalized.clone(),
            properties: Properties::from([(
                props::FILE_PATH.to_string(),
                serde_json::Value::from(normalized),
            )]),
            created_at: now(),
            source_conversation_id: None,
            confidence: 1.0,
        }
    }

    /// Well-known id of the Session node for `session_id`.
    pub fn session_id_for(session_id: &str) -> NodeId {
        format!("session:{}", session_id)
    }

    /// Well-known id of the File node for `path`.
    pub fn file_id_for(path: &str) -> NodeId {
        format!("file:{}", normalize_path(path))
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_source_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.source_conversation_id = Some(conversation_id.into());
        self
    }

    /// Set a property value.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Importance score stored at ingestion, 0.0 when absent.
    pub fn importance(&self) -> f64 {
        self.properties
            .get(props::IMPORTANCE)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// Whether the node has been archived.
    pub fn is_archived(&self) -> bool {
        self.properties
            .get(props::ARCHIVED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Case-insensitive containment check against title and content.
    pub fn mentions(&self, needle_lower: &str) -> bool {
        self.content.to_lowercase().contains(needle_lower)
            || self.title.to_lowercase().contains(needle_lower)
    }
}

/// Derive a display title from content: the first line, truncated.
pub fn derive_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", truncated.trim_end())
}

/// Normalize a file path for use as a stable key.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    trimmed
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(trimmed)
}

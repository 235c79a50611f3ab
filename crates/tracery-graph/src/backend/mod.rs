//! Graph backend traits for pluggable storage.
//!
//! A backend hands out two kinds of access:
//!
//! - [`GraphView`]: a read-only view of one committed snapshot.
//! - [`GraphWriter`]: a view plus mutations, valid for the duration of one
//!   atomic write transaction.
//!
//! Backends implement only the raw primitives (`insert_node`, `insert_edge`,
//! ...). The checked operations (`create_node`, `upsert_node`, `create_edge`,
//! `update_node`) are provided methods on [`GraphWriter`], so every backend
//! enforces the same rules in the same order.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tracery_graph::{GraphBackend, GraphView, GraphWriter, NativeGraphBackend, WriteOptions};
//! use tracery_types::{Node, NodeType};
//!
//! let backend = NativeGraphBackend::in_memory();
//! let node = Node::new(NodeType::Insight, "caching helps");
//! backend
//!     .write(&WriteOptions::default(), &mut |w| {
//!         w.create_node(&node, "k1")?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let view = backend.view(Duration::from_secs(1)).unwrap();
//! assert_eq!(view.stats().unwrap().node_count, 1);
//! ```

mod native;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracery_types::{
    Direction, Edge, EdgeId, Node, NodeId, NodeType, RelationshipType, Timestamp, props,
};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::validation::{validate_edge_result, validate_node_result};

pub use native::NativeGraphBackend;
pub use sqlite::SqliteGraphBackend;

/// Default timeout for persistence calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Backend selection
// ─────────────────────────────────────────────────────────────────────────────

/// Which storage adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Adjacency-list graph with an optional JSON snapshot file.
    #[default]
    Native,
    /// Relational emulation on SQLite.
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "memory" => Ok(Self::Native),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(GraphError::Validation(format!(
                "unknown backend '{}', expected 'native' or 'sqlite'",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write options, cancellation and deadlines
// ─────────────────────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a caller and a write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the write fails at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one write transaction.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Budget for lock acquisition plus the whole transaction.
    pub timeout: Duration,
    /// Optional cancellation flag.
    pub cancel: Option<CancelFlag>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }
}

impl WriteOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Deadline and cancellation state of a running transaction.
#[derive(Debug, Clone)]
pub(crate) struct TxnGuard {
    deadline: Instant,
    timeout: Duration,
    cancel: Option<CancelFlag>,
}

impl TxnGuard {
    pub(crate) fn new(options: &WriteOptions) -> Self {
        Self {
            deadline: Instant::now() + options.timeout,
            timeout: options.timeout,
            cancel: options.cancel.clone(),
        }
    }

    /// Time left before the deadline.
    pub(crate) fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(GraphError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(GraphError::Timeout(self.timeout));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Node selection applied by [`GraphView::scan_nodes`].
///
/// Empty fields select everything. Results are ordered by
/// `(created_at, id)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilter {
    /// Restrict to these node types.
    pub types: Vec<NodeType>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<Timestamp>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<Timestamp>,
    /// Restrict to nodes carrying this `session_id` property.
    pub session_id: Option<String>,
    /// Case-insensitive substring of content or title.
    pub text: Option<String>,
    /// Include archived nodes.
    pub include_archived: bool,
}

impl NodeFilter {
    pub fn all() -> Self {
        Self {
            include_archived: true,
            ..Default::default()
        }
    }

    pub fn of_types(types: impl IntoIterator<Item = NodeType>) -> Self {
        Self {
            types: types.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn containing(mut self, text: &str) -> Self {
        self.text = Some(text.to_lowercase());
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Created before `before` and, when given, at or after `after`.
    pub fn between(mut self, after: Option<Timestamp>, before: Timestamp) -> Self {
        self.created_after = after;
        self.created_before = Some(before);
        self
    }

    pub fn with_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    /// Whether `node` passes the filter.
    pub fn matches(&self, node: &Node) -> bool {
        if !self.types.is_empty() && !self.types.contains(&node.node_type) {
            return false;
        }
        if self.created_after.is_some_and(|t| node.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| node.created_at >= t) {
            return false;
        }
        if !self.include_archived && node.is_archived() {
            return false;
        }
        if let Some(session_id) = &self.session_id {
            let node_session = node.properties.get(props::SESSION_ID).and_then(|v| v.as_str());
            if node_session != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !node.mentions(&needle) {
                return false;
            }
        }
        true
    }
}

/// Node and edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

/// Outcome of [`GraphWriter::upsert_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// Id of the stored node (the existing id on merge).
    pub id: NodeId,
    /// Whether a new node was created.
    pub created: bool,
    /// The node as stored after the write.
    pub node: Node,
}

/// Outcome of [`GraphWriter::create_edge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeWrite {
    /// A new edge was persisted.
    Created(EdgeId),
    /// The triple already existed; nothing was written.
    Existing(EdgeId),
}

impl EdgeWrite {
    pub fn id(&self) -> &EdgeId {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Sort nodes into the deterministic list order.
pub(crate) fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Sort edges into the deterministic list order.
pub(crate) fn sort_edges(edges: &mut [Edge]) {
    edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Merge an incoming duplicate into the stored node.
///
/// Existing property values win; confidence and importance never decrease.
pub fn merge_nodes(existing: &Node, incoming: &Node) -> Node {
    let mut merged = existing.clone();
    for (key, value) in &incoming.properties {
        merged
            .properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    merged.confidence = existing.confidence.max(incoming.confidence);

    let has_importance = existing.properties.contains_key(props::IMPORTANCE)
        || incoming.properties.contains_key(props::IMPORTANCE);
    if has_importance {
        let importance = existing.importance().max(incoming.importance());
        merged
            .properties
            .insert(props::IMPORTANCE.to_string(), importance.into());
    }

    if merged.source_conversation_id.is_none() {
        merged.source_conversation_id = incoming.source_conversation_id.clone();
    }
    merged
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Read access to one consistent snapshot of the graph.
///
/// List results are ordered by `(created_at, id)` on every backend.
pub trait GraphView {
    /// Get a node by id. Returns `Ok(None)` if it does not exist.
    fn node(&self, id: &str) -> Result<Option<Node>>;

    /// Get the node stored under a dedup key.
    fn node_by_dedup_key(&self, key: &str) -> Result<Option<Node>>;

    /// Edges touching `node_id` on the given side, optionally of one type.
    fn edges_of(
        &self,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>>;

    /// The edge for an exact `(source, target, relationship)` triple.
    fn edge_between(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: RelationshipType,
    ) -> Result<Option<Edge>>;

    /// Nodes passing `filter`.
    fn scan_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>>;

    /// Every edge in the graph.
    fn all_edges(&self) -> Result<Vec<Edge>>;

    /// Node and edge counts.
    fn stats(&self) -> Result<GraphStats>;
}

/// Write access inside one atomic transaction.
///
/// # Errors
///
/// Every provided method checks the transaction deadline and cancellation
/// flag first, failing with [`GraphError::Timeout`] or
/// [`GraphError::Cancelled`]; the backend then rolls the whole transaction
/// back.
pub trait GraphWriter: GraphView {
    /// Insert a node without checks.
    fn insert_node(&mut self, node: &Node, dedup_key: &str) -> Result<()>;

    /// Overwrite an existing node's fields, keeping its dedup key.
    fn replace_node(&mut self, node: &Node) -> Result<()>;

    /// Insert an edge without checks.
    fn insert_edge(&mut self, edge: &Edge) -> Result<()>;

    /// Fail if the transaction deadline passed or the caller cancelled.
    fn checkpoint(&self) -> Result<()>;

    /// Create a node.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id or dedup key is already taken.
    fn create_node(&mut self, node: &Node, dedup_key: &str) -> Result<NodeId> {
        self.checkpoint()?;
        validate_node_result(node)?;

        if self.node(&node.id)?.is_some() {
            return Err(GraphError::Conflict(format!("node {} already exists", node.id)));
        }
        if let Some(existing) = self.node_by_dedup_key(dedup_key)? {
            return Err(GraphError::Conflict(format!(
                "dedup key already stored as node {}",
                existing.id
            )));
        }

        self.insert_node(node, dedup_key)?;
        debug!(id = %node.id, node_type = %node.node_type, "Created node");
        Ok(node.id.clone())
    }

    /// Create the node, or merge it into the node already stored under
    /// `dedup_key`.
    fn upsert_node(&mut self, node: &Node, dedup_key: &str) -> Result<Upserted> {
        self.checkpoint()?;
        validate_node_result(node)?;

        if let Some(existing) = self.node_by_dedup_key(dedup_key)? {
            let merged = merge_nodes(&existing, node);
            if merged != existing {
                self.replace_node(&merged)?;
            }
            debug!(id = %existing.id, "Merged duplicate node");
            return Ok(Upserted {
                id: existing.id,
                created: false,
                node: merged,
            });
        }

        if self.node(&node.id)?.is_some() {
            return Err(GraphError::Conflict(format!(
                "node {} already exists under another dedup key",
                node.id
            )));
        }

        self.insert_node(node, dedup_key)?;
        debug!(id = %node.id, node_type = %node.node_type, "Created node");
        Ok(Upserted {
            id: node.id.clone(),
            created: true,
            node: node.clone(),
        })
    }

    /// Create an edge between two existing nodes.
    ///
    /// An edge with the same `(source, target, relationship)` triple is a
    /// no-op that returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either endpoint is missing and `Validation` for
    /// self-loops or out-of-range confidence.
    fn create_edge(&mut self, edge: &Edge) -> Result<EdgeWrite> {
        self.checkpoint()?;
        validate_edge_result(edge)?;

        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if self.node(endpoint)?.is_none() {
                return Err(GraphError::NotFound(format!("node {}", endpoint)));
            }
        }

        if let Some(existing) = self.edge_between(
            &edge.source_node_id,
            &edge.target_node_id,
            edge.relationship_type,
        )? {
            return Ok(EdgeWrite::Existing(existing.id));
        }

        self.insert_edge(edge)?;
        debug!(
            source = %edge.source_node_id,
            target = %edge.target_node_id,
            relationship = %edge.relationship_type,
            "Created edge"
        );
        Ok(EdgeWrite::Created(edge.id.clone()))
    }

    /// Overwrite an existing node.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the node does not exist.
    fn update_node(&mut self, node: &Node) -> Result<()> {
        self.checkpoint()?;
        validate_node_result(node)?;

        if self.node(&node.id)?.is_none() {
            return Err(GraphError::NotFound(format!("node {}", node.id)));
        }
        self.replace_node(node)
    }
}

/// A storage adapter.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Writes are serialized by the
/// backend; views never observe a partially applied write.
pub trait GraphBackend: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// A view of the latest committed state.
    fn view(&self, timeout: Duration) -> Result<Box<dyn GraphView + '_>>;

    /// Run `f` in one transaction: commit on `Ok`, roll back on `Err`.
    fn write(
        &self,
        options: &WriteOptions,
        f: &mut dyn FnMut(&mut dyn GraphWriter) -> Result<()>,
    ) -> Result<()>;
}

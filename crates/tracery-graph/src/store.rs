//! Backend-agnostic graph facade.
//!
//! [`GraphStore`] wraps any [`GraphBackend`] and adds the graph-level
//! operations: checked node/edge writes, lazy neighbor and breadth-first
//! iteration, keyword search and analytics.

use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracery_types::{Direction, Edge, Node, NodeId, NodeType, RelationshipType, props};
use tracing::info;

use crate::analytics::{self, GraphAnalytics};
use crate::backend::{
    BackendKind, DEFAULT_TIMEOUT, EdgeWrite, GraphBackend, GraphStats, GraphView, GraphWriter,
    NativeGraphBackend, NodeFilter, SqliteGraphBackend, Upserted, WriteOptions,
};
use crate::dedup::dedup_key_for;
use crate::error::{GraphError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// A view that is either owned by an iterator or borrowed from the caller.
pub enum ViewRef<'a> {
    Owned(Box<dyn GraphView + 'a>),
    Borrowed(&'a dyn GraphView),
}

impl<'a> Deref for ViewRef<'a> {
    type Target = dyn GraphView + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(view) => view.as_ref(),
            Self::Borrowed(view) => *view,
        }
    }
}

/// Relationship types and direction followed on every traversal hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipFilter {
    /// Allowed relationship types; empty allows all.
    pub types: Vec<RelationshipType>,
    pub direction: Direction,
}

impl RelationshipFilter {
    pub fn new(types: impl IntoIterator<Item = RelationshipType>, direction: Direction) -> Self {
        Self {
            types: types.into_iter().collect(),
            direction,
        }
    }

    /// Every relationship type, in both directions.
    pub fn any() -> Self {
        Self {
            types: Vec::new(),
            direction: Direction::Both,
        }
    }

    pub fn allows(&self, relationship: RelationshipType) -> bool {
        self.types.is_empty() || self.types.contains(&relationship)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Iterators
// ─────────────────────────────────────────────────────────────────────────────

/// Lazy iterator over the nodes adjacent to one node.
///
/// Each adjacent node is yielded once, in edge order. Nodes are loaded one
/// at a time as the iterator advances.
pub struct Neighbors<'a> {
    view: ViewRef<'a>,
    node_id: NodeId,
    edges: std::vec::IntoIter<Edge>,
    seen: HashSet<NodeId>,
}

impl<'a> Neighbors<'a> {
    pub fn new(
        view: ViewRef<'a>,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Self> {
        let edges = view.edges_of(node_id, relationship, direction)?;
        Ok(Self {
            view,
            node_id: node_id.to_string(),
            edges: edges.into_iter(),
            seen: HashSet::new(),
        })
    }
}

impl Iterator for Neighbors<'_> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let edge = self.edges.next()?;
            let Some(other) = edge.other_end(&self.node_id) else {
                continue;
            };
            if !self.seen.insert(other.to_string()) {
                continue;
            }
            match self.view.node(other) {
                Ok(Some(node)) => return Some(Ok(node)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Lazy breadth-first traversal yielding `(node, depth)`.
///
/// The start node is not yielded. Every other reachable node is yielded
/// exactly once, at its shortest depth, up to `max_depth` hops.
pub struct Traversal<'a> {
    view: ViewRef<'a>,
    filter: RelationshipFilter,
    max_depth: usize,
    queue: VecDeque<(NodeId, usize)>,
    visited: HashSet<NodeId>,
}

impl<'a> Traversal<'a> {
    pub fn new(
        view: ViewRef<'a>,
        start_id: &str,
        max_depth: usize,
        filter: RelationshipFilter,
    ) -> Self {
        let mut visited = HashSet::new();
        visited.insert(start_id.to_string());
        Self {
            view,
            filter,
            max_depth,
            queue: VecDeque::from([(start_id.to_string(), 0)]),
            visited,
        }
    }

    fn expand(&mut self, node_id: &str, depth: usize) -> Result<()> {
        let relationship = match self.filter.types.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        let edges = self
            .view
            .edges_of(node_id, relationship, self.filter.direction)?;
        for edge in edges {
            if !self.filter.allows(edge.relationship_type) {
                continue;
            }
            if let Some(other) = edge.other_end(node_id)
                && self.visited.insert(other.to_string())
            {
                self.queue.push_back((other.to_string(), depth + 1));
            }
        }
        Ok(())
    }
}

impl Iterator for Traversal<'_> {
    type Item = Result<(Node, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, depth)) = self.queue.pop_front() {
            if depth < self.max_depth
                && let Err(e) = self.expand(&id, depth)
            {
                return Some(Err(e));
            }
            if depth == 0 {
                continue;
            }
            match self.view.node(&id) {
                Ok(Some(node)) => return Some(Ok((node, depth))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Graph store facade over a shared backend.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GraphStore {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// An empty native store kept in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(NativeGraphBackend::in_memory()))
    }

    /// Open a store of the given kind. Without a path the store lives in
    /// memory.
    pub fn open(kind: BackendKind, path: Option<&Path>) -> Result<Self> {
        let backend: Arc<dyn GraphBackend> = match (kind, path) {
            (BackendKind::Native, Some(path)) => Arc::new(NativeGraphBackend::open(path)?),
            (BackendKind::Native, None) => Arc::new(NativeGraphBackend::in_memory()),
            (BackendKind::Sqlite, Some(path)) => Arc::new(SqliteGraphBackend::open(path)?),
            (BackendKind::Sqlite, None) => Arc::new(SqliteGraphBackend::open_in_memory()?),
        };
        info!(backend = backend.name(), "Graph store ready");
        Ok(Self::new(backend))
    }

    /// Default timeout for calls that take none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Write options carrying the store's default timeout.
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::new(self.timeout)
    }

    /// Run `f` in one atomic transaction and return its value.
    pub fn write<T>(
        &self,
        options: &WriteOptions,
        f: impl FnOnce(&mut dyn GraphWriter) -> Result<T>,
    ) -> Result<T> {
        let mut f = Some(f);
        let mut output = None;
        self.backend.write(options, &mut |writer| {
            let f = f
                .take()
                .ok_or_else(|| GraphError::InvalidData("transaction body already ran".into()))?;
            output = Some(f(writer)?);
            Ok(())
        })?;
        output.ok_or_else(|| GraphError::InvalidData("transaction produced no value".into()))
    }

    /// A view of the latest committed snapshot.
    pub fn view(&self) -> Result<Box<dyn GraphView + '_>> {
        self.backend.view(self.timeout)
    }

    // ── Writes ──────────────────────────────────────────────────────────────

    /// Create a node, keyed by its content (or id for Session/File nodes).
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id or dedup key is already taken.
    pub fn create_node(&self, node: &Node) -> Result<NodeId> {
        let key = dedup_key_for(node);
        self.write(&self.write_options(), |w| w.create_node(node, &key))
    }

    /// Create the node or merge it into the one stored under `dedup_key`.
    pub fn upsert_node(&self, node: &Node, dedup_key: &str) -> Result<Upserted> {
        self.write(&self.write_options(), |w| w.upsert_node(node, dedup_key))
    }

    /// Create an edge; an existing triple is returned unchanged.
    pub fn create_edge(&self, edge: &Edge) -> Result<EdgeWrite> {
        self.write(&self.write_options(), |w| w.create_edge(edge))
    }

    pub fn update_node(&self, node: &Node) -> Result<()> {
        self.write(&self.write_options(), |w| w.update_node(node))
    }

    /// Mark a node archived. It stays traversable but leaves search results.
    pub fn archive_node(&self, id: &str) -> Result<Node> {
        self.write(&self.write_options(), |w| {
            let node = w
                .node(id)?
                .ok_or_else(|| GraphError::NotFound(format!("node {}", id)))?;
            let archived = node.with_property(props::ARCHIVED, true);
            w.update_node(&archived)?;
            Ok(archived)
        })
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Result<Option<Node>> {
        self.view()?.node(id)
    }

    /// Adjacent nodes, lazily loaded.
    pub fn neighbors(
        &self,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Neighbors<'_>> {
        Neighbors::new(ViewRef::Owned(self.view()?), node_id, relationship, direction)
    }

    /// Breadth-first traversal from `from_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the start node does not exist.
    pub fn traverse(
        &self,
        from_id: &str,
        max_depth: usize,
        filter: RelationshipFilter,
    ) -> Result<Traversal<'_>> {
        let view = self.view()?;
        if view.node(from_id)?.is_none() {
            return Err(GraphError::NotFound(format!("node {}", from_id)));
        }
        Ok(Traversal::new(ViewRef::Owned(view), from_id, max_depth, filter))
    }

    /// Non-archived nodes whose content or title contains `keyword`,
    /// case-insensitively.
    pub fn search(&self, keyword: &str) -> Result<Vec<Node>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        self.view()?.scan_nodes(&NodeFilter::default().containing(keyword))
    }

    /// Nodes first discussed in a session.
    pub fn session_nodes(&self, session_id: &str) -> Result<Vec<Node>> {
        let view = self.view()?;
        let session_node = Node::session_id_for(session_id);
        sources_of(&*view, &session_node, RelationshipType::WasDiscussedIn)
    }

    /// Nodes that modify a file, earliest first.
    pub fn file_history(&self, path: &str) -> Result<Vec<Node>> {
        let view = self.view()?;
        let file_node = Node::file_id_for(path);
        sources_of(&*view, &file_node, RelationshipType::Modifies)
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.view()?.stats()
    }

    /// Counts by type and the `top_n` most connected nodes.
    pub fn analytics(&self, top_n: usize) -> Result<GraphAnalytics> {
        analytics::compute(&*self.view()?, top_n)
    }

    /// Every node of one type, including archived ones.
    pub fn nodes_of_type(&self, node_type: NodeType) -> Result<Vec<Node>> {
        self.view()?
            .scan_nodes(&NodeFilter::of_types([node_type]).with_archived(true))
    }
}

/// Sources of incoming `relationship` edges into `target_id`, in list order.
pub(crate) fn sources_of(
    view: &dyn GraphView,
    target_id: &str,
    relationship: RelationshipType,
) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for edge in view.edges_of(target_id, Some(relationship), Direction::Incoming)? {
        if let Some(node) = view.node(&edge.source_node_id)? {
            nodes.push(node);
        }
    }
    crate::backend::sort_nodes(&mut nodes);
    nodes.dedup_by(|a, b| a.id == b.id);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_chain() -> (GraphStore, Vec<Node>) {
        let store = GraphStore::in_memory();
        let nodes: Vec<Node> = ["a", "b", "c", "d"]
            .iter()
            .map(|c| Node::new(NodeType::Insight, format!("node {}", c)))
            .collect();
        for node in &nodes {
            store.create_node(node).unwrap();
        }
        // a -> b -> c -> d
        for pair in nodes.windows(2) {
            store
                .create_edge(&Edge::new(
                    &pair[0].id,
                    &pair[1].id,
                    RelationshipType::WasInformedBy,
                ))
                .unwrap();
        }
        (store, nodes)
    }

    #[test]
    fn test_write_returns_value() {
        let store = GraphStore::in_memory();
        let node = Node::new(NodeType::Insight, "caching helps");
        let id = store
            .write(&store.write_options(), |w| w.create_node(&node, "k"))
            .unwrap();
        assert_eq!(id, node.id);
    }

    #[test]
    fn test_create_node_conflict() {
        let store = GraphStore::in_memory();
        let node = Node::new(NodeType::Insight, "caching helps");
        store.create_node(&node).unwrap();
        assert!(matches!(
            store.create_node(&node),
            Err(GraphError::Conflict(_))
        ));

        let same_content = Node::new(NodeType::Insight, "Caching helps");
        assert!(matches!(
            store.create_node(&same_content),
            Err(GraphError::Conflict(_))
        ));
    }

    #[test]
    fn test_neighbors_lazy_and_unique() {
        let (store, nodes) = store_with_chain();
        store
            .create_edge(&Edge::new(&nodes[1].id, &nodes[0].id, RelationshipType::ResultsFrom))
            .unwrap();

        let around_b: Vec<Node> = store
            .neighbors(&nodes[1].id, None, Direction::Both)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<&str> = around_b.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&nodes[0].id.as_str()));
        assert!(ids.contains(&nodes[2].id.as_str()));

        let outgoing: Vec<Node> = store
            .neighbors(&nodes[1].id, Some(RelationshipType::WasInformedBy), Direction::Outgoing)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].id, nodes[2].id);
    }

    #[test]
    fn test_traverse_depths() {
        let (store, nodes) = store_with_chain();
        let filter = RelationshipFilter::new([RelationshipType::WasInformedBy], Direction::Outgoing);

        let reached: Vec<(Node, usize)> = store
            .traverse(&nodes[0].id, 2, filter.clone())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let summary: Vec<(&str, usize)> =
            reached.iter().map(|(n, d)| (n.id.as_str(), *d)).collect();
        assert_eq!(summary, vec![(nodes[1].id.as_str(), 1), (nodes[2].id.as_str(), 2)]);

        let none: Vec<_> = store
            .traverse(&nodes[3].id, 5, filter)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_traverse_filter_excludes_other_types() {
        let (store, nodes) = store_with_chain();
        let filter = RelationshipFilter::new([RelationshipType::Modifies], Direction::Both);
        let reached: Vec<_> = store
            .traverse(&nodes[0].id, 5, filter)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(reached.is_empty());
    }

    #[test]
    fn test_traverse_handles_cycles() {
        let (store, nodes) = store_with_chain();
        store
            .create_edge(&Edge::new(&nodes[3].id, &nodes[0].id, RelationshipType::WasInformedBy))
            .unwrap();
        let reached: Vec<_> = store
            .traverse(&nodes[0].id, 10, RelationshipFilter::any())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(reached.len(), 3);
    }

    #[test]
    fn test_traverse_missing_start() {
        let store = GraphStore::in_memory();
        assert!(matches!(
            store.traverse("missing", 3, RelationshipFilter::any()),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn test_search_excludes_archived() {
        let store = GraphStore::in_memory();
        let keep = Node::new(NodeType::Decision, "Use a 60-day LOOKBACK");
        let hide = Node::new(NodeType::Insight, "lookback windows reduce noise");
        store.create_node(&keep).unwrap();
        store.create_node(&hide).unwrap();
        store.archive_node(&hide.id).unwrap();

        let hits = store.search("lookback").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, keep.id);
        assert!(store.search("   ").unwrap().is_empty());

        // archived nodes stay reachable by id
        assert!(store.node(&hide.id).unwrap().unwrap().is_archived());
    }

    #[test]
    fn test_archive_missing_node() {
        let store = GraphStore::in_memory();
        assert!(matches!(
            store.archive_node("nope"),
            Err(GraphError::NotFound(_))
        ));
    }
}

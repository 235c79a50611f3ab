//! In-process adjacency-list backend.
//!
//! The committed graph lives in an `Arc<GraphState>`. A write clones the
//! state, applies the transaction to the clone, optionally persists it as a
//! JSON snapshot, and only then swaps the `Arc`. Readers holding the old
//! `Arc` keep a consistent view; a failed write simply drops its clone.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracery_types::{Direction, Edge, EdgeId, Node, NodeId, RelationshipType};
use tracing::{debug, info};

use super::{
    GraphBackend, GraphStats, GraphView, GraphWriter, NodeFilter, TxnGuard, WriteOptions,
    sort_edges, sort_nodes,
};
use crate::error::{GraphError, Result};

/// Snapshot file format version.
const SNAPSHOT_VERSION: u32 = 1;

type Triple = (NodeId, NodeId, RelationshipType);

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNode {
    node: Node,
    dedup_key: String,
}

/// The whole graph plus its lookup indices.
///
/// Only `nodes` and `edges` are serialized; indices are rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphState {
    #[serde(default)]
    version: u32,
    nodes: BTreeMap<NodeId, StoredNode>,
    edges: BTreeMap<EdgeId, Edge>,
    #[serde(skip)]
    dedup: HashMap<String, NodeId>,
    #[serde(skip)]
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    #[serde(skip)]
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    #[serde(skip)]
    triples: HashMap<Triple, EdgeId>,
}

impl GraphState {
    fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut state: GraphState = serde_json::from_str(&raw)?;
        if state.version > SNAPSHOT_VERSION {
            return Err(GraphError::InvalidData(format!(
                "snapshot version {} is newer than supported version {}",
                state.version, SNAPSHOT_VERSION
            )));
        }
        state.rebuild_indices()?;
        Ok(state)
    }

    fn rebuild_indices(&mut self) -> Result<()> {
        self.dedup.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.triples.clear();

        for (id, stored) in &self.nodes {
            if self.dedup.insert(stored.dedup_key.clone(), id.clone()).is_some() {
                return Err(GraphError::InvalidData(format!(
                    "duplicate dedup key in snapshot at node {}",
                    id
                )));
            }
        }

        let edges: Vec<Edge> = self.edges.values().cloned().collect();
        for edge in &edges {
            if !self.nodes.contains_key(&edge.source_node_id)
                || !self.nodes.contains_key(&edge.target_node_id)
            {
                return Err(GraphError::InvalidData(format!(
                    "edge {} references a missing node",
                    edge.id
                )));
            }
            self.index_edge(edge);
        }
        Ok(())
    }

    fn index_edge(&mut self, edge: &Edge) {
        self.outgoing
            .entry(edge.source_node_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target_node_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.triples.insert(
            (
                edge.source_node_id.clone(),
                edge.target_node_id.clone(),
                edge.relationship_type,
            ),
            edge.id.clone(),
        );
    }

    fn add_node(&mut self, node: &Node, dedup_key: &str) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::Conflict(format!("node {} already exists", node.id)));
        }
        if self.dedup.contains_key(dedup_key) {
            return Err(GraphError::Conflict(format!(
                "dedup key for node {} already stored",
                node.id
            )));
        }
        self.dedup.insert(dedup_key.to_string(), node.id.clone());
        self.nodes.insert(
            node.id.clone(),
            StoredNode {
                node: node.clone(),
                dedup_key: dedup_key.to_string(),
            },
        );
        Ok(())
    }

    fn replace_node(&mut self, node: &Node) -> Result<()> {
        let stored = self
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| GraphError::NotFound(format!("node {}", node.id)))?;
        stored.node = node.clone();
        Ok(())
    }

    fn add_edge(&mut self, edge: &Edge) -> Result<()> {
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::NotFound(format!("node {}", endpoint)));
            }
        }
        let triple = (
            edge.source_node_id.clone(),
            edge.target_node_id.clone(),
            edge.relationship_type,
        );
        if self.triples.contains_key(&triple) || self.edges.contains_key(&edge.id) {
            return Err(GraphError::Conflict(format!("edge {} already exists", edge.id)));
        }
        self.edges.insert(edge.id.clone(), edge.clone());
        self.index_edge(edge);
        Ok(())
    }

    fn node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|s| s.node.clone())
    }

    fn node_by_dedup_key(&self, key: &str) -> Option<Node> {
        self.dedup.get(key).and_then(|id| self.node(id))
    }

    fn edges_of(
        &self,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Vec<Edge> {
        let out = self.outgoing.get(node_id).into_iter().flatten();
        let inc = self.incoming.get(node_id).into_iter().flatten();
        let ids: Vec<&EdgeId> = match direction {
            Direction::Outgoing => out.collect(),
            Direction::Incoming => inc.collect(),
            Direction::Both => out.chain(inc).collect(),
        };

        let mut edges: Vec<Edge> = ids
            .into_iter()
            .filter_map(|id| self.edges.get(id))
            .filter(|e| relationship.is_none_or(|r| e.relationship_type == r))
            .cloned()
            .collect();
        sort_edges(&mut edges);
        edges
    }

    fn edge_between(&self, source: &str, target: &str, rel: RelationshipType) -> Option<Edge> {
        self.triples
            .get(&(source.to_string(), target.to_string(), rel))
            .and_then(|id| self.edges.get(id))
            .cloned()
    }

    fn scan_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .values()
            .map(|s| &s.node)
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        sort_nodes(&mut nodes);
        nodes
    }

    fn all_edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.edges.values().cloned().collect();
        sort_edges(&mut edges);
        edges
    }

    fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views and transactions
// ─────────────────────────────────────────────────────────────────────────────

/// A view over a shared snapshot (`Arc`) or a transaction's private copy
/// (`Box`).
struct NativeGraph<S> {
    state: S,
    guard: Option<TxnGuard>,
}

impl<S: Deref<Target = GraphState>> GraphView for NativeGraph<S> {
    fn node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.state.node(id))
    }

    fn node_by_dedup_key(&self, key: &str) -> Result<Option<Node>> {
        Ok(self.state.node_by_dedup_key(key))
    }

    fn edges_of(
        &self,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>> {
        Ok(self.state.edges_of(node_id, relationship, direction))
    }

    fn edge_between(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: RelationshipType,
    ) -> Result<Option<Edge>> {
        Ok(self.state.edge_between(source_id, target_id, relationship))
    }

    fn scan_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        Ok(self.state.scan_nodes(filter))
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        Ok(self.state.all_edges())
    }

    fn stats(&self) -> Result<GraphStats> {
        Ok(self.state.stats())
    }
}

impl GraphWriter for NativeGraph<Box<GraphState>> {
    fn insert_node(&mut self, node: &Node, dedup_key: &str) -> Result<()> {
        self.state.add_node(node, dedup_key)
    }

    fn replace_node(&mut self, node: &Node) -> Result<()> {
        self.state.replace_node(node)
    }

    fn insert_edge(&mut self, edge: &Edge) -> Result<()> {
        self.state.add_edge(edge)
    }

    fn checkpoint(&self) -> Result<()> {
        match &self.guard {
            Some(guard) => guard.check(),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Adjacency-list graph with copy-on-write snapshots.
///
/// With a path, every commit atomically replaces a JSON snapshot file
/// (write to a temporary file, then rename). A failed write leaves the
/// previous snapshot both on disk and in memory.
pub struct NativeGraphBackend {
    current: RwLock<Arc<GraphState>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for NativeGraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeGraphBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl NativeGraphBackend {
    /// A backend that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(Arc::new(GraphState::default())),
            writer: Mutex::new(()),
            path: None,
        }
    }

    /// Open or create a backend persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let state = if path.exists() {
            GraphState::load(path)?
        } else {
            GraphState::default()
        };

        info!(
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            "Native graph opened at {:?}",
            path
        );
        Ok(Self {
            current: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            path: Some(path.to_path_buf()),
        })
    }

    /// The snapshot file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(path: &Path, state: &mut GraphState) -> Result<()> {
        state.version = SNAPSHOT_VERSION;
        let bytes = serde_json::to_vec(state)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(bytes = bytes.len(), "Snapshot written to {:?}", path);
        Ok(())
    }
}

impl GraphBackend for NativeGraphBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn view(&self, timeout: Duration) -> Result<Box<dyn GraphView + '_>> {
        let state = self
            .current
            .try_read_for(timeout)
            .ok_or(GraphError::Timeout(timeout))?
            .clone();
        Ok(Box::new(NativeGraph { state, guard: None }))
    }

    fn write(
        &self,
        options: &WriteOptions,
        f: &mut dyn FnMut(&mut dyn GraphWriter) -> Result<()>,
    ) -> Result<()> {
        let guard = TxnGuard::new(options);
        let _writer = self
            .writer
            .try_lock_for(options.timeout)
            .ok_or(GraphError::Timeout(options.timeout))?;
        guard.check()?;

        let base = self.current.read().clone();
        let mut txn = NativeGraph {
            state: Box::new(GraphState::clone(&base)),
            guard: Some(guard),
        };

        f(&mut txn)?;
        txn.checkpoint()?;

        let NativeGraph { mut state, guard } = txn;
        if let Some(path) = &self.path {
            Self::persist(path, &mut state)?;
        }

        let timeout = guard.map_or(options.timeout, |g| g.remaining());
        let mut current = self
            .current
            .try_write_for(timeout.max(Duration::from_millis(1)))
            .ok_or(GraphError::Timeout(options.timeout))?;
        *current = Arc::new(*state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_types::NodeType;

    fn node(content: &str) -> Node {
        Node::new(NodeType::Insight, content)
    }

    #[test]
    fn test_write_commits() {
        let backend = NativeGraphBackend::in_memory();
        let a = node("alpha");
        let b = node("beta");
        backend
            .write(&WriteOptions::default(), &mut |w| {
                w.create_node(&a, "a")?;
                w.create_node(&b, "b")?;
                w.create_edge(&Edge::new(&a.id, &b.id, RelationshipType::WasInformedBy))?;
                Ok(())
            })
            .unwrap();

        let view = backend.view(Duration::from_secs(1)).unwrap();
        assert_eq!(
            view.stats().unwrap(),
            GraphStats {
                node_count: 2,
                edge_count: 1
            }
        );
        assert_eq!(view.node_by_dedup_key("b").unwrap().unwrap().id, b.id);
    }

    #[test]
    fn test_error_rolls_back() {
        let backend = NativeGraphBackend::in_memory();
        let a = node("alpha");
        let result = backend.write(&WriteOptions::default(), &mut |w| {
            w.create_node(&a, "a")?;
            Err(GraphError::InvalidData("boom".into()))
        });
        assert!(result.is_err());

        let view = backend.view(Duration::from_secs(1)).unwrap();
        assert_eq!(view.stats().unwrap().node_count, 0);
    }

    #[test]
    fn test_old_view_is_stable() {
        let backend = NativeGraphBackend::in_memory();
        let before = backend.view(Duration::from_secs(1)).unwrap();

        let a = node("alpha");
        backend
            .write(&WriteOptions::default(), &mut |w| {
                w.create_node(&a, "a")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(before.stats().unwrap().node_count, 0);
        let after = backend.view(Duration::from_secs(1)).unwrap();
        assert_eq!(after.stats().unwrap().node_count, 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let a = node("alpha");
        let b = node("beta");

        {
            let backend = NativeGraphBackend::open(&path).unwrap();
            backend
                .write(&WriteOptions::default(), &mut |w| {
                    w.create_node(&a, "a")?;
                    w.create_node(&b, "b")?;
                    w.create_edge(&Edge::new(&a.id, &b.id, RelationshipType::References))?;
                    Ok(())
                })
                .unwrap();
        }

        let reopened = NativeGraphBackend::open(&path).unwrap();
        let view = reopened.view(Duration::from_secs(1)).unwrap();
        assert_eq!(view.stats().unwrap().edge_count, 1);
        assert_eq!(view.node(&a.id).unwrap().unwrap(), a);
        assert!(
            view.edge_between(&a.id, &b.id, RelationshipType::References)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_io_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let backend = NativeGraphBackend::open(&path).unwrap();

        let a = node("alpha");
        backend
            .write(&WriteOptions::default(), &mut |w| {
                w.create_node(&a, "a")?;
                Ok(())
            })
            .unwrap();

        // Replace the snapshot file with a non-empty directory so the rename fails.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("blocker"), b"x").unwrap();

        let b = node("beta");
        let result = backend.write(&WriteOptions::default(), &mut |w| {
            w.create_node(&b, "b")?;
            Ok(())
        });
        assert!(matches!(result, Err(GraphError::Io(_))));

        let view = backend.view(Duration::from_secs(1)).unwrap();
        assert_eq!(view.stats().unwrap().node_count, 1);
        assert!(view.node(&b.id).unwrap().is_none());
    }

    #[test]
    fn test_rejects_newer_snapshot_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, r#"{"version": 99, "nodes": {}, "edges": {}}"#).unwrap();
        assert!(matches!(
            NativeGraphBackend::open(&path),
            Err(GraphError::InvalidData(_))
        ));
    }
}

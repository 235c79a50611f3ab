//! Common test utilities for graph integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tracery_graph::{BackendKind, GraphStore};
use tracery_types::{Node, NodeType};

/// A store backed by files in a temporary directory.
pub struct TestGraph {
    pub store: GraphStore,
    pub path: PathBuf,
    pub kind: BackendKind,
    /// Kept alive for the lifetime of the store.
    pub temp_dir: TempDir,
}

impl TestGraph {
    pub fn open(kind: BackendKind) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let file = match kind {
            BackendKind::Native => "graph.json",
            BackendKind::Sqlite => "graph.db",
        };
        let path = temp_dir.path().join(file);
        let store = GraphStore::open(kind, Some(&path))?;
        Ok(Self {
            store,
            path,
            kind,
            temp_dir,
        })
    }

    /// Open a second store over the same files.
    pub fn reopen(&self) -> Result<GraphStore> {
        Ok(GraphStore::open(self.kind, Some(&self.path))?)
    }
}

pub fn native() -> Result<TestGraph> {
    TestGraph::open(BackendKind::Native)
}

pub fn sqlite() -> Result<TestGraph> {
    TestGraph::open(BackendKind::Sqlite)
}

/// Fixed timestamp `minutes` after a reference instant.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::minutes(minutes)
}

/// A node with a fixed id and timestamp.
pub fn node(id: &str, node_type: NodeType, content: &str, minutes: i64) -> Node {
    Node::new(node_type, content)
        .with_id(id)
        .with_created_at(at(minutes))
}

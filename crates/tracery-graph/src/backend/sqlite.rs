//! Relational emulation of the graph on SQLite.
//!
//! Nodes and edges are plain tables. The unique indexes on `dedup_key` and on
//! the `(source, target, relationship)` triple back the dedup and idempotency
//! rules; referential integrity is checked by the writer before each insert.
//! Text matching and list ordering happen in Rust so results match the
//! native backend exactly.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Params, Row, params, params_from_iter};
use tracery_types::{Direction, Edge, Node, NodeType, Properties, RelationshipType, Timestamp};
use tracing::{debug, info};

use super::{
    GraphBackend, GraphStats, GraphView, GraphWriter, NodeFilter, TxnGuard, WriteOptions,
    sort_edges, sort_nodes,
};
use crate::error::{GraphError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

const NODE_COLUMNS: &str =
    "id, node_type, title, content, properties, created_at, source_conversation_id, confidence";

const EDGE_COLUMNS: &str =
    "id, source_node_id, target_node_id, relationship_type, properties, confidence, created_at";

/// Fixed-width timestamps so string comparison matches time order.
fn encode_time(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(raw: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GraphError::InvalidData(format!("bad timestamp '{}': {}", raw, e)))
}

fn decode_properties(raw: &str) -> Result<Properties> {
    Ok(serde_json::from_str(raw)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

struct NodeRow {
    id: String,
    node_type: String,
    title: String,
    content: String,
    properties: String,
    created_at: String,
    source_conversation_id: Option<String>,
    confidence: f64,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_type: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            properties: row.get(4)?,
            created_at: row.get(5)?,
            source_conversation_id: row.get(6)?,
            confidence: row.get(7)?,
        })
    }

    fn into_node(self) -> Result<Node> {
        let node_type = NodeType::parse(&self.node_type).ok_or_else(|| {
            GraphError::InvalidData(format!("unknown node type '{}'", self.node_type))
        })?;
        Ok(Node {
            id: self.id,
            node_type,
            title: self.title,
            content: self.content,
            properties: decode_properties(&self.properties)?,
            created_at: decode_time(&self.created_at)?,
            source_conversation_id: self.source_conversation_id,
            confidence: self.confidence,
        })
    }
}

struct EdgeRow {
    id: String,
    source_node_id: String,
    target_node_id: String,
    relationship_type: String,
    properties: String,
    confidence: f64,
    created_at: String,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_node_id: row.get(1)?,
            target_node_id: row.get(2)?,
            relationship_type: row.get(3)?,
            properties: row.get(4)?,
            confidence: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_edge(self) -> Result<Edge> {
        let relationship_type = RelationshipType::parse(&self.relationship_type).ok_or_else(|| {
            GraphError::InvalidData(format!(
                "unknown relationship type '{}'",
                self.relationship_type
            ))
        })?;
        Ok(Edge {
            id: self.id,
            source_node_id: self.source_node_id,
            target_node_id: self.target_node_id,
            relationship_type,
            properties: decode_properties(&self.properties)?,
            confidence: self.confidence,
            created_at: decode_time(&self.created_at)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views and transactions
// ─────────────────────────────────────────────────────────────────────────────

/// Graph access over a locked connection (views) or an open transaction.
struct SqlGraph<C> {
    conn: C,
    guard: Option<TxnGuard>,
}

impl<C: Deref<Target = Connection>> SqlGraph<C> {
    fn query_nodes<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, NodeRow::from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?.into_node()?);
        }
        Ok(nodes)
    }

    fn query_edges<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, EdgeRow::from_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?.into_edge()?);
        }
        Ok(edges)
    }
}

impl<C: Deref<Target = Connection>> GraphView for SqlGraph<C> {
    fn node(&self, id: &str) -> Result<Option<Node>> {
        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
        Ok(self.query_nodes(&sql, [id])?.into_iter().next())
    }

    fn node_by_dedup_key(&self, key: &str) -> Result<Option<Node>> {
        let sql = format!("SELECT {} FROM nodes WHERE dedup_key = ?1", NODE_COLUMNS);
        Ok(self.query_nodes(&sql, [key])?.into_iter().next())
    }

    fn edges_of(
        &self,
        node_id: &str,
        relationship: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>> {
        let side = match direction {
            Direction::Outgoing => "source_node_id = ?1",
            Direction::Incoming => "target_node_id = ?1",
            Direction::Both => "(source_node_id = ?1 OR target_node_id = ?1)",
        };
        let sql = format!(
            "SELECT {} FROM edges WHERE {} AND (?2 IS NULL OR relationship_type = ?2)",
            EDGE_COLUMNS, side
        );
        let mut edges = self.query_edges(&sql, params![node_id, relationship.map(|r| r.as_str())])?;
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn edge_between(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: RelationshipType,
    ) -> Result<Option<Edge>> {
        let sql = format!(
            "SELECT {} FROM edges
             WHERE source_node_id = ?1 AND target_node_id = ?2 AND relationship_type = ?3",
            EDGE_COLUMNS
        );
        Ok(self
            .query_edges(&sql, params![source_id, target_id, relationship.as_str()])?
            .into_iter()
            .next())
    }

    fn scan_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let mut sql = format!("SELECT {} FROM nodes WHERE 1 = 1", NODE_COLUMNS);
        let mut values: Vec<String> = Vec::new();

        if !filter.types.is_empty() {
            let placeholders = vec!["?"; filter.types.len()].join(", ");
            sql.push_str(&format!(" AND node_type IN ({})", placeholders));
            values.extend(filter.types.iter().map(|t| t.as_str().to_string()));
        }
        if let Some(after) = &filter.created_after {
            sql.push_str(" AND created_at >= ?");
            values.push(encode_time(after));
        }
        if let Some(before) = &filter.created_before {
            sql.push_str(" AND created_at < ?");
            values.push(encode_time(before));
        }

        let mut nodes: Vec<Node> = self
            .query_nodes(&sql, params_from_iter(values.iter()))?
            .into_iter()
            .filter(|n| filter.matches(n))
            .collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        let sql = format!("SELECT {} FROM edges", EDGE_COLUMNS);
        let mut edges = self.query_edges(&sql, [])?;
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn stats(&self) -> Result<GraphStats> {
        let node_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edge_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(GraphStats {
            node_count: node_count as usize,
            edge_count: edge_count as usize,
        })
    }
}

impl<'c> GraphWriter for SqlGraph<&'c Connection> {
    fn insert_node(&mut self, node: &Node, dedup_key: &str) -> Result<()> {
        let properties = serde_json::to_string(&node.properties)?;
        self.conn.execute(
            "INSERT INTO nodes (id, node_type, title, content, properties, created_at,
                                source_conversation_id, confidence, dedup_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                node.id,
                node.node_type.as_str(),
                node.title,
                node.content,
                properties,
                encode_time(&node.created_at),
                node.source_conversation_id,
                node.confidence,
                dedup_key,
            ],
        )?;
        Ok(())
    }

    fn replace_node(&mut self, node: &Node) -> Result<()> {
        let properties = serde_json::to_string(&node.properties)?;
        let changed = self.conn.execute(
            "UPDATE nodes
             SET node_type = ?2, title = ?3, content = ?4, properties = ?5, created_at = ?6,
                 source_conversation_id = ?7, confidence = ?8
             WHERE id = ?1",
            params![
                node.id,
                node.node_type.as_str(),
                node.title,
                node.content,
                properties,
                encode_time(&node.created_at),
                node.source_conversation_id,
                node.confidence,
            ],
        )?;
        if changed == 0 {
            return Err(GraphError::NotFound(format!("node {}", node.id)));
        }
        Ok(())
    }

    fn insert_edge(&mut self, edge: &Edge) -> Result<()> {
        let properties = serde_json::to_string(&edge.properties)?;
        self.conn.execute(
            "INSERT INTO edges (id, source_node_id, target_node_id, relationship_type,
                                properties, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.id,
                edge.source_node_id,
                edge.target_node_id,
                edge.relationship_type.as_str(),
                properties,
                edge.confidence,
                encode_time(&edge.created_at),
            ],
        )?;
        Ok(())
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

/// Graph stored in one SQLite file.
///
/// Reads and writes share one connection behind a lock; a view holds the
/// lock for its lifetime, so it never observes an uncommitted transaction.
pub struct SqliteGraphBackend {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteGraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteGraphBackend {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        Self::initialize(&conn)?;

        info!("SQLite graph opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;

        info!("In-memory SQLite graph created");
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(super::DEFAULT_TIMEOUT)?;
        Self::create_schema(conn)
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                source_conversation_id TEXT,
                confidence REAL NOT NULL,
                dedup_key TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type
                ON nodes(node_type);

            CREATE INDEX IF NOT EXISTS idx_nodes_created_at
                ON nodes(created_at);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_node_id TEXT NOT NULL,
                target_node_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (source_node_id, target_node_id, relationship_type)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source
                ON edges(source_node_id, relationship_type);

            CREATE INDEX IF NOT EXISTS idx_edges_target
                ON edges(target_node_id, relationship_type);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }
}

impl GraphBackend for SqliteGraphBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn view(&self, timeout: Duration) -> Result<Box<dyn GraphView + '_>> {
        let conn = self
            .conn
            .try_lock_for(timeout)
            .ok_or(GraphError::Timeout(timeout))?;
        Ok(Box::new(SqlGraph { conn, guard: None }))
    }

    fn write(
        &self,
        options: &WriteOptions,
        f: &mut dyn FnMut(&mut dyn GraphWriter) -> Result<()>,
    ) -> Result<()> {
        let guard = TxnGuard::new(options);
        let mut conn = self
            .conn
            .try_lock_for(options.timeout)
            .ok_or(GraphError::Timeout(options.timeout))?;
        guard.check()?;
        conn.busy_timeout(guard.remaining().max(Duration::from_millis(1)))?;

        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction()?;
        {
            let mut txn = SqlGraph {
                conn: &*tx,
                guard: Some(guard),
            };
            f(&mut txn)?;
            txn.checkpoint()?;
        }
        tx.commit()?;
        Ok(())
    }
}

//! Knowledge graph storage and queries for Tracery.
//!
//! This crate turns free-form conversation text into a typed, persistent
//! knowledge graph and answers provenance questions against it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ingestor                                                               │
//! │  - Extractor + ImportanceScorer (tracery-extract)                       │
//! │  - RelationshipBuilder: provenance, files, similarity, co-occurrence    │
//! │  - One atomic write per request                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  QueryEngine                                                            │
//! │  - Decision traces, search, session and file history                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  GraphStore → dyn GraphBackend                                          │
//! │  - NativeGraphBackend: copy-on-write snapshot, JSON file                │
//! │  - SqliteGraphBackend: single SQLite file with WAL mode                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tracery_graph::{GraphStore, Ingestor, QueryEngine};
//! use tracery_types::{IngestContext, IngestRequest};
//!
//! let store = GraphStore::in_memory();
//! let ingestor = Ingestor::new(store.clone());
//!
//! let context = IngestContext::new("S1").with_file("risk.py");
//! let request = IngestRequest::new(
//!     context,
//!     "We decided to use a 60-day lookback because longer windows reduce noise.",
//! );
//! let report = ingestor.ingest(&request)?;
//! println!("{} nodes created", report.created.len());
//!
//! let engine = QueryEngine::new(store);
//! for trace in engine.decision_trace("lookback")? {
//!     println!("{}", trace.matched.title);
//! }
//! # Ok::<(), tracery_graph::GraphError>(())
//! ```

pub mod analytics;
pub mod backend;
pub mod builder;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod query;
pub mod similarity;
pub mod store;
pub mod validation;

pub use analytics::{ConnectedNode, GraphAnalytics};
pub use backend::{
    BackendKind, CancelFlag, DEFAULT_TIMEOUT, EdgeWrite, GraphBackend, GraphStats, GraphView,
    GraphWriter, NativeGraphBackend, NodeFilter, SqliteGraphBackend, Upserted, WriteOptions,
    merge_nodes,
};
pub use builder::{BuilderConfig, RelationshipBuilder};
pub use error::{GraphError, Result};
pub use ingest::{IngestReport, Ingestor, RejectedCandidate};
pub use query::{DecisionTrace, QueryConfig, QueryEngine, SearchHit};
pub use store::{GraphStore, Neighbors, RelationshipFilter, Traversal, ViewRef};

//! Read-only questions over the knowledge graph.
//!
//! Every query runs against one committed snapshot and returns an empty
//! collection, never an error, when nothing matches.

use serde::{Deserialize, Serialize};
use tracery_types::{Direction, Node, NodeRecord, NodeType, RelationshipType};
use tracing::debug;

use crate::backend::{GraphView, NodeFilter, sort_nodes};
use crate::error::Result;
use crate::store::{GraphStore, RelationshipFilter, Traversal, ViewRef, sources_of};

const PHRASE_BONUS: f64 = 0.5;
const TITLE_BONUS: f64 = 0.25;

/// Query limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Hop limit for influence chains and artifact collection.
    pub max_trace_depth: usize,
    /// Maximum search results.
    pub search_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_trace_depth: 5,
            search_limit: 20,
        }
    }
}

/// Why a decision or insight came to be, and what it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub matched: NodeRecord,
    /// Nodes that informed the match, earliest first.
    pub influence_chain: Vec<NodeRecord>,
    /// Files and nodes reached through MODIFIES / RESULTS_FROM.
    pub affected_artifacts: Vec<NodeRecord>,
    /// Action items that result from the match.
    pub follow_ups: Vec<NodeRecord>,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: NodeRecord,
    pub relevance: f64,
}

/// Decision traces, ranked search and history lookups.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: GraphStore,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(store: GraphStore) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: GraphStore, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Trace every Decision or Insight mentioning `topic`, archived ones included.
    ///
    /// Traces are ordered by the matched node's creation time.
    pub fn decision_trace(&self, topic: &str) -> Result<Vec<DecisionTrace>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Ok(Vec::new());
        }

        let view = self.store.view()?;
        let filter = NodeFilter::of_types([NodeType::Decision, NodeType::Insight])
            .containing(topic)
            .with_archived(true);
        let matches = view.scan_nodes(&filter)?;
        debug!(topic, matches = matches.len(), "Tracing decisions");

        let depth = self.config.max_trace_depth;
        let mut traces = Vec::with_capacity(matches.len());
        for node in &matches {
            let influence_chain = reach(
                &*view,
                &node.id,
                depth,
                RelationshipFilter::new([RelationshipType::WasInformedBy], Direction::Outgoing),
            )?;
            let affected_artifacts = reach(
                &*view,
                &node.id,
                depth,
                RelationshipFilter::new(
                    [RelationshipType::Modifies, RelationshipType::ResultsFrom],
                    Direction::Outgoing,
                ),
            )?;
            let follow_ups: Vec<Node> = sources_of(&*view, &node.id, RelationshipType::ResultsFrom)?
                .into_iter()
                .filter(|n| n.node_type == NodeType::ActionItem)
                .collect();

            traces.push(DecisionTrace {
                matched: record(&*view, node)?,
                influence_chain: records(&*view, &influence_chain)?,
                affected_artifacts: records(&*view, &affected_artifacts)?,
                follow_ups: records(&*view, &follow_ups)?,
            });
        }
        Ok(traces)
    }

    /// Rank non-archived nodes against the terms of `query`.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let phrase = terms.join(" ");

        let view = self.store.view()?;
        let mut scored: Vec<(f64, Node)> = view
            .scan_nodes(&NodeFilter::default())?
            .into_iter()
            .filter_map(|node| relevance(&node, &terms, &phrase).map(|r| (r, node)))
            .collect();

        scored.sort_by(|(ra, a), (rb, b)| {
            rb.total_cmp(ra)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| b.importance().total_cmp(&a.importance()))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(self.config.search_limit);

        scored
            .into_iter()
            .map(|(relevance, node)| {
                Ok(SearchHit {
                    record: record(&*view, &node)?,
                    relevance,
                })
            })
            .collect()
    }

    /// Nodes discussed in a session, earliest first.
    pub fn session_insights(&self, session_id: &str) -> Result<Vec<NodeRecord>> {
        let view = self.store.view()?;
        let target = Node::session_id_for(session_id);
        let nodes = sources_of(&*view, &target, RelationshipType::WasDiscussedIn)?;
        records(&*view, &nodes)
    }

    /// Nodes that modified a file, earliest first.
    pub fn file_modification_history(&self, path: &str) -> Result<Vec<NodeRecord>> {
        let view = self.store.view()?;
        let target = Node::file_id_for(path);
        let nodes = sources_of(&*view, &target, RelationshipType::Modifies)?;
        records(&*view, &nodes)
    }

    /// Everything within `depth` hops of a node, in either direction, nearest
    /// first.
    pub fn insight_network(&self, node_id: &str, depth: usize) -> Result<Vec<NodeRecord>> {
        let view = self.store.view()?;
        if view.node(node_id)?.is_none() {
            return Ok(Vec::new());
        }

        let reached: Vec<(Node, usize)> =
            Traversal::new(ViewRef::Borrowed(&*view), node_id, depth, RelationshipFilter::any())
                .collect::<Result<_>>()?;
        reached.iter().map(|(node, _)| record(&*view, node)).collect()
    }
}

/// Nodes reachable from `start` under `filter`, ordered by creation time.
fn reach(
    view: &dyn GraphView,
    start: &str,
    depth: usize,
    filter: RelationshipFilter,
) -> Result<Vec<Node>> {
    let mut nodes: Vec<Node> = Traversal::new(ViewRef::Borrowed(view), start, depth, filter)
        .map(|step| step.map(|(node, _)| node))
        .collect::<Result<_>>()?;
    sort_nodes(&mut nodes);
    Ok(nodes)
}

fn record(view: &dyn GraphView, node: &Node) -> Result<NodeRecord> {
    let outbound = view.edges_of(&node.id, None, Direction::Outgoing)?;
    Ok(NodeRecord::from_node(node, &outbound))
}

fn records(view: &dyn GraphView, nodes: &[Node]) -> Result<Vec<NodeRecord>> {
    nodes.iter().map(|node| record(view, node)).collect()
}

/// Relevance of `node`, or `None` when no term occurs in it.
fn relevance(node: &Node, terms: &[String], phrase: &str) -> Option<f64> {
    let content = node.content.to_lowercase();
    let title = node.title.to_lowercase();

    let hits = terms
        .iter()
        .filter(|t| content.contains(t.as_str()) || title.contains(t.as_str()))
        .count();
    if hits == 0 {
        return None;
    }

    let mut score = hits as f64 / terms.len() as f64;
    if terms.len() > 1 && (content.contains(phrase) || title.contains(phrase)) {
        score += PHRASE_BONUS;
    }
    if terms.iter().any(|t| title.contains(t.as_str())) {
        score += TITLE_BONUS;
    }
    Some(score)
}

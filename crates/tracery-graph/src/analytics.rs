//! Whole-graph summary statistics.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracery_types::{NodeId, NodeType};

use crate::backend::{GraphView, NodeFilter};
use crate::error::Result;

/// A node ranked by how many edges touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    pub degree: usize,
}

/// Counts by node and relationship type plus the most connected nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalytics {
    pub node_count: usize,
    pub edge_count: usize,
    pub archived_count: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub most_connected: Vec<ConnectedNode>,
}

pub(crate) fn compute(view: &dyn GraphView, top_n: usize) -> Result<GraphAnalytics> {
    let nodes = view.scan_nodes(&NodeFilter::all())?;
    let edges = view.all_edges()?;

    let mut analytics = GraphAnalytics {
        node_count: nodes.len(),
        edge_count: edges.len(),
        ..Default::default()
    };

    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in &edges {
        *analytics
            .edges_by_type
            .entry(edge.relationship_type.as_str().to_string())
            .or_default() += 1;
        *degree.entry(edge.source_node_id.as_str()).or_default() += 1;
        *degree.entry(edge.target_node_id.as_str()).or_default() += 1;
    }

    for node in &nodes {
        *analytics
            .nodes_by_type
            .entry(node.node_type.as_str().to_string())
            .or_default() += 1;
        if node.is_archived() {
            analytics.archived_count += 1;
        }
    }

    let mut ranked: Vec<ConnectedNode> = nodes
        .iter()
        .filter_map(|node| {
            let d = degree.get(node.id.as_str()).copied().unwrap_or(0);
            (d > 0).then(|| ConnectedNode {
                id: node.id.clone(),
                node_type: node.node_type,
                title: node.title.clone(),
                degree: d,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(top_n);
    analytics.most_connected = ranked;

    Ok(analytics)
}

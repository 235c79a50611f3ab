//! Relationship building for freshly ingested nodes.
//!
//! Runs inside the ingestion write transaction. Every edge goes through
//! [`GraphWriter::create_edge`], so re-running the builder on a node that was
//! already processed creates nothing.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tracery_extract::extract_file_references;
use tracery_types::{
    Direction, Edge, IngestContext, Node, NodeId, NodeType, RelationshipType, props,
};
use tracing::debug;

use crate::backend::{GraphWriter, NodeFilter};
use crate::dedup::dedup_key_for;
use crate::error::Result;
use crate::similarity::{jaccard, tokenize};

/// Edge `reason` values.
pub mod reasons {
    pub const PROVENANCE: &str = "provenance";
    pub const FILE_MENTION: &str = "file_mention";
    pub const SIMILARITY: &str = "similarity";
    pub const CO_OCCURRENCE: &str = "co_occurrence";
}

const PROVENANCE_CONFIDENCE: f64 = 1.0;
const DECISION_INSIGHT_CONFIDENCE: f64 = 0.7;
const ACTION_DECISION_CONFIDENCE: f64 = 0.6;
const AGENT_CONFIDENCE: f64 = 0.5;

/// Words whose presence marks content as changing a file.
const CHANGE_INTENT_STEMS: [&str; 16] = [
    "modify", "change", "update", "implement", "refactor", "fix", "add", "remove", "rename",
    "rewrite", "replace", "use", "switch", "migrate", "edit", "create",
];

/// Relationship builder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Minimum Jaccard similarity for a `WAS_INFORMED_BY` link.
    pub similarity_threshold: f64,
    /// Maximum similarity links per node.
    pub fan_out: usize,
    /// How far back similarity candidates may be.
    pub lookback_days: i64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            fan_out: 3,
            lookback_days: 30,
        }
    }
}

/// Creates provenance, file, similarity and co-occurrence edges.
#[derive(Debug, Clone, Default)]
pub struct RelationshipBuilder {
    config: BuilderConfig,
}

impl RelationshipBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Ensure the Session node exists, linking it to the previous session.
    ///
    /// Returns the session node id and the number of edges created.
    pub fn ensure_session(
        &self,
        writer: &mut dyn GraphWriter,
        context: &IngestContext,
    ) -> Result<(NodeId, usize)> {
        let session = Node::session(&context.session_id).with_created_at(context.timestamp);
        let stored = writer.upsert_node(&session, &dedup_key_for(&session))?;

        let mut created = 0;
        if let Some(previous) = context
            .previous_session_id
            .as_deref()
            .filter(|p| *p != context.session_id)
        {
            let prior = Node::session(previous).with_created_at(context.timestamp);
            let prior = writer.upsert_node(&prior, &dedup_key_for(&prior))?;
            let edge = Edge::new(&stored.id, &prior.id, RelationshipType::Follows)
                .with_confidence(PROVENANCE_CONFIDENCE)
                .with_property(props::REASON, reasons::PROVENANCE);
            if writer.create_edge(&edge)?.is_created() {
                created += 1;
            }
        }
        Ok((stored.id, created))
    }

    /// Provenance, file and similarity edges for one node.
    ///
    /// `node` must already be stored. Returns the number of edges created.
    pub fn link(
        &self,
        writer: &mut dyn GraphWriter,
        node: &Node,
        context: &IngestContext,
    ) -> Result<usize> {
        let mut created = 0;
        if node.node_type.requires_provenance() {
            created += self.link_provenance(writer, node, context)?;
            created += self.link_files(writer, node, context)?;
        }
        if node.node_type.is_knowledge() {
            created += self.link_similar(writer, node, context)?;
        }
        Ok(created)
    }

    fn link_provenance(
        &self,
        writer: &mut dyn GraphWriter,
        node: &Node,
        context: &IngestContext,
    ) -> Result<usize> {
        let existing = writer.edges_of(
            &node.id,
            Some(RelationshipType::WasDiscussedIn),
            Direction::Outgoing,
        )?;
        if !existing.is_empty() {
            return Ok(0);
        }

        let session_id = Node::session_id_for(&context.session_id);
        let edge = Edge::new(&node.id, session_id, RelationshipType::WasDiscussedIn)
            .with_confidence(PROVENANCE_CONFIDENCE)
            .with_property(props::REASON, reasons::PROVENANCE);
        Ok(usize::from(writer.create_edge(&edge)?.is_created()))
    }

    fn link_files(
        &self,
        writer: &mut dyn GraphWriter,
        node: &Node,
        context: &IngestContext,
    ) -> Result<usize> {
        let relationship = if has_change_intent(&node.content) {
            RelationshipType::Modifies
        } else {
            RelationshipType::References
        };

        let mut paths: Vec<String> = context.file_paths.clone();
        paths.extend(extract_file_references(&node.content));

        let mut seen: Vec<NodeId> = Vec::new();
        let mut created = 0;
        for path in paths.iter().filter(|p| !p.trim().is_empty()) {
            let file = Node::file(path).with_created_at(context.timestamp);
            if seen.contains(&file.id) {
                continue;
            }
            seen.push(file.id.clone());

            let stored = writer.upsert_node(&file, &dedup_key_for(&file))?;
            let edge = Edge::new(&node.id, &stored.id, relationship)
                .with_confidence(node.confidence)
                .with_property(props::REASON, reasons::FILE_MENTION);
            if writer.create_edge(&edge)?.is_created() {
                created += 1;
            }
        }
        Ok(created)
    }

    fn link_similar(
        &self,
        writer: &mut dyn GraphWriter,
        node: &Node,
        context: &IngestContext,
    ) -> Result<usize> {
        if self.config.fan_out == 0 {
            return Ok(0);
        }

        // A window reaching past the representable range has no lower bound.
        let window_start = ChronoDuration::try_days(self.config.lookback_days)
            .and_then(|window| node.created_at.checked_sub_signed(window));
        let prior = NodeFilter::of_types(NodeType::KNOWLEDGE).between(window_start, node.created_at);

        let mut candidates =
            writer.scan_nodes(&prior.clone().in_session(context.session_id.clone()))?;
        candidates.retain(|c| c.id != node.id);
        if candidates.is_empty() {
            candidates = writer.scan_nodes(&prior)?;
            candidates.retain(|c| c.id != node.id);
        }

        let tokens = tokenize(&node.content);
        let mut scored: Vec<(f64, Node)> = candidates
            .into_iter()
            .map(|c| (jaccard(&tokens, &tokenize(&c.content)), c))
            .filter(|(sim, _)| *sim >= self.config.similarity_threshold)
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut created = 0;
        for (similarity, other) in scored.into_iter().take(self.config.fan_out) {
            let edge = Edge::new(&node.id, &other.id, RelationshipType::WasInformedBy)
                .with_confidence(similarity.clamp(0.0, 1.0))
                .with_property(props::REASON, reasons::SIMILARITY)
                .with_property(props::SIMILARITY, similarity);
            if writer.create_edge(&edge)?.is_created() {
                debug!(from = %node.id, to = %other.id, similarity, "Linked similar node");
                created += 1;
            }
        }
        Ok(created)
    }

    /// Co-occurrence edges between the stored nodes of one batch.
    pub fn link_batch(&self, writer: &mut dyn GraphWriter, batch: &[Node]) -> Result<usize> {
        let of_type = |t: NodeType| batch.iter().filter(move |n| n.node_type == t);

        let mut planned: Vec<Edge> = Vec::new();
        for decision in of_type(NodeType::Decision) {
            for insight in of_type(NodeType::Insight) {
                planned.push(co_occurrence(
                    decision,
                    insight,
                    RelationshipType::WasInformedBy,
                    DECISION_INSIGHT_CONFIDENCE,
                ));
            }
        }
        for action in of_type(NodeType::ActionItem) {
            for decision in of_type(NodeType::Decision) {
                planned.push(co_occurrence(
                    action,
                    decision,
                    RelationshipType::ResultsFrom,
                    ACTION_DECISION_CONFIDENCE,
                ));
            }
        }
        for agent in of_type(NodeType::Agent) {
            for knowledge in batch.iter().filter(|n| n.node_type.is_knowledge()) {
                planned.push(co_occurrence(
                    knowledge,
                    agent,
                    RelationshipType::PerformedBy,
                    AGENT_CONFIDENCE,
                ));
            }
        }

        let mut created = 0;
        for edge in planned.iter().filter(|e| !e.is_self_loop()) {
            if writer.create_edge(edge)?.is_created() {
                created += 1;
            }
        }
        Ok(created)
    }
}

fn co_occurrence(from: &Node, to: &Node, relationship: RelationshipType, confidence: f64) -> Edge {
    Edge::new(&from.id, &to.id, relationship)
        .with_confidence(confidence)
        .with_property(props::REASON, reasons::CO_OCCURRENCE)
}

/// Whether `content` contains a change-intent word in any common inflection.
pub fn has_change_intent(content: &str) -> bool {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .any(|word| CHANGE_INTENT_STEMS.iter().any(|stem| is_inflection_of(&word, stem)))
}

fn is_inflection_of(word: &str, stem: &str) -> bool {
    if word == stem {
        return true;
    }
    let Some(suffix) = word.strip_prefix(stem) else {
        return inflected_stem_forms(word, stem);
    };
    matches!(suffix, "s" | "es" | "ed" | "d" | "ing")
}

/// Forms that drop or change the stem's last letter: `use` -> `using`,
/// `modify` -> `modifies`/`modified`.
fn inflected_stem_forms(word: &str, stem: &str) -> bool {
    if let Some(base) = stem.strip_suffix('e')
        && let Some(suffix) = word.strip_prefix(base)
    {
        return suffix == "ing";
    }
    if let Some(base) = stem.strip_suffix('y')
        && let Some(suffix) = word.strip_prefix(base)
    {
        return matches!(suffix, "ies" | "ied");
    }
    false
}

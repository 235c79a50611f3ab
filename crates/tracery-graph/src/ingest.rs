//! Ingestion pipeline: text in, nodes and edges out.
//!
//! Extraction and scoring are pure and happen before any lock is taken.
//! Everything that touches the graph for one request runs inside a single
//! write transaction, so a failure leaves the graph exactly as it was.

use std::collections::HashSet;

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tracery_extract::{
    Candidate, Extractor, ImportanceScorer, ScoringSignals, extract_file_references,
};
use tracery_types::{IngestContext, IngestRequest, Node, NodeId, NodeType, props};
use tracing::{debug, info, warn};

use crate::backend::{GraphWriter, WriteOptions};
use crate::builder::RelationshipBuilder;
use crate::dedup::dedup_key_for;
use crate::error::{GraphError, Result};
use crate::store::GraphStore;
use crate::validation::{ValidationError, validate_confidence, validate_content, validate_session_id};

/// Order in which candidate categories are written.
const CATEGORY_ORDER: [NodeType; 5] = [
    NodeType::Insight,
    NodeType::Decision,
    NodeType::ActionItem,
    NodeType::Test,
    NodeType::Agent,
];

fn category_rank(node_type: NodeType) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|t| *t == node_type)
        .unwrap_or(CATEGORY_ORDER.len())
}

/// A candidate excluded before reaching the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub category: NodeType,
    pub content: String,
    pub reason: String,
}

/// Outcome of one committed ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Id of the request's Session node.
    pub session_node_id: NodeId,
    /// Nodes created by this request.
    pub created: Vec<NodeId>,
    /// Existing nodes a candidate was merged into.
    pub merged: Vec<NodeId>,
    /// Edges created by this request.
    pub edges_created: usize,
    pub rejected: Vec<RejectedCandidate>,
}

/// A candidate that passed validation, with its importance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub importance: f64,
}

/// Extraction and scoring output for one request, ready to commit.
#[derive(Debug, Clone)]
pub struct PreparedIngest {
    pub context: IngestContext,
    /// Valid candidates in write order.
    pub accepted: Vec<ScoredCandidate>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Runs requests through extraction, scoring, storage and linking.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: GraphStore,
    extractor: Extractor,
    scorer: ImportanceScorer,
    builder: RelationshipBuilder,
}

impl Ingestor {
    /// An ingestor with the default pattern table, weights and builder.
    pub fn new(store: GraphStore) -> Self {
        Self {
            store,
            extractor: Extractor::default(),
            scorer: ImportanceScorer::default(),
            builder: RelationshipBuilder::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_scorer(mut self, scorer: ImportanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_builder(mut self, builder: RelationshipBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Ingest one request with the store's default timeout.
    pub fn ingest(&self, request: &IngestRequest) -> Result<IngestReport> {
        self.ingest_with(request, &self.store.write_options())
    }

    /// Ingest one request as a single atomic batch.
    pub fn ingest_with(
        &self,
        request: &IngestRequest,
        options: &WriteOptions,
    ) -> Result<IngestReport> {
        let prepared = self.prepare(request)?;
        self.commit(&prepared, options)
    }

    /// Ingest several requests.
    ///
    /// Extraction and scoring run on one thread per request; each request is
    /// then committed as its own batch, in input order. One failing request
    /// does not stop the others.
    pub fn ingest_many(&self, requests: &[IngestRequest]) -> Vec<Result<IngestReport>> {
        let prepared: Vec<Result<PreparedIngest>> = std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| scope.spawn(move || self.prepare(request)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(GraphError::InvalidData("extraction thread panicked".into()))
                    })
                })
                .collect()
        });

        let options = self.store.write_options();
        prepared
            .into_iter()
            .map(|p| p.and_then(|p| self.commit(&p, &options)))
            .collect()
    }

    /// Extract, score and validate candidates. Touches no storage.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the session id is empty.
    pub fn prepare(&self, request: &IngestRequest) -> Result<PreparedIngest> {
        let context = &request.context;
        validate_session_id(&context.session_id)?;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for candidate in self.extractor.extract(&request.raw_text) {
            if let Err(err) = check_candidate(&candidate) {
                warn!(
                    category = %candidate.category,
                    reason = %err,
                    "Rejected candidate"
                );
                rejected.push(RejectedCandidate {
                    category: candidate.category,
                    content: candidate.content,
                    reason: err.to_string(),
                });
                continue;
            }

            let has_files = !context.file_paths.is_empty()
                || !extract_file_references(&candidate.content).is_empty();
            let signals = ScoringSignals::new(has_files, context.completion_event);
            let importance = self.scorer.score(&candidate, &signals);
            accepted.push(ScoredCandidate {
                candidate,
                importance,
            });
        }

        accepted.sort_by(|a, b| {
            category_rank(a.candidate.category)
                .cmp(&category_rank(b.candidate.category))
                .then_with(|| a.candidate.span.start.cmp(&b.candidate.span.start))
        });

        Ok(PreparedIngest {
            context: context.clone(),
            accepted,
            rejected,
        })
    }

    /// Write a prepared request in one transaction.
    pub fn commit(&self, prepared: &PreparedIngest, options: &WriteOptions) -> Result<IngestReport> {
        let context = &prepared.context;
        let result = self
            .store
            .write(options, |writer| self.apply(writer, prepared));

        match &result {
            Ok(report) => info!(
                session = %context.session_id,
                created = report.created.len(),
                merged = report.merged.len(),
                edges = report.edges_created,
                rejected = report.rejected.len(),
                "Ingested conversation"
            ),
            Err(e) => warn!(
                session = %context.session_id,
                error = %e,
                "Ingestion rolled back"
            ),
        }
        result
    }

    fn apply(&self, writer: &mut dyn GraphWriter, prepared: &PreparedIngest) -> Result<IngestReport> {
        let context = &prepared.context;
        let (session_node_id, mut edges_created) = self.builder.ensure_session(writer, context)?;

        let mut report = IngestReport {
            session_node_id,
            rejected: prepared.rejected.clone(),
            ..Default::default()
        };

        let mut batch: Vec<Node> = Vec::with_capacity(prepared.accepted.len());
        let mut seen: HashSet<NodeId> = HashSet::new();
        for (seq, scored) in prepared.accepted.iter().enumerate() {
            let node = candidate_node(scored, context, seq);
            let stored = writer.upsert_node(&node, &dedup_key_for(&node))?;
            if stored.created {
                report.created.push(stored.id.clone());
            } else {
                report.merged.push(stored.id.clone());
            }

            edges_created += self.builder.link(writer, &stored.node, context)?;
            if seen.insert(stored.id.clone()) {
                batch.push(stored.node);
            }
        }

        edges_created += self.builder.link_batch(writer, &batch)?;
        report.edges_created = edges_created;
        debug!(nodes = batch.len(), edges = edges_created, "Batch linked");
        Ok(report)
    }
}

fn check_candidate(candidate: &Candidate) -> std::result::Result<(), ValidationError> {
    validate_content(&candidate.content)?;
    validate_confidence(candidate.confidence)
}

/// Build the node for a candidate.
///
/// `created_at` is offset by the write position so nodes of one batch keep
/// their order.
fn candidate_node(scored: &ScoredCandidate, context: &IngestContext, seq: usize) -> Node {
    let candidate = &scored.candidate;
    let offset = ChronoDuration::microseconds(i64::try_from(seq).unwrap_or(i64::MAX));

    let mut node = Node::new(candidate.category, candidate.content.clone())
        .with_confidence(candidate.confidence)
        .with_created_at(
            context
                .timestamp
                .checked_add_signed(offset)
                .unwrap_or(context.timestamp),
        )
        .with_property(props::IMPORTANCE, scored.importance)
        .with_property(props::CATEGORY_WEIGHT, candidate.confidence)
        .with_property(props::TRIGGER, candidate.trigger.clone())
        .with_property(props::SESSION_ID, context.session_id.clone())
        .with_property(props::INGEST_SEQ, seq as u64);

    if let Some(conversation) = &context.conversation_id {
        node = node.with_source_conversation(conversation.clone());
    }
    if let Some(user) = &context.attribution.user_id {
        node = node.with_property(props::USER_ID, user.clone());
    }
    if let Some(channel) = &context.attribution.channel_id {
        node = node.with_property(props::CHANNEL_ID, channel.clone());
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_extract::{ExtractorConfig, PatternRule, PatternTable};
    use tracery_types::Attribution;

    fn request(session: &str, text: &str) -> IngestRequest {
        IngestRequest::new(IngestContext::new(session).with_file("risk.py"), text)
    }

    #[test]
    fn test_prepare_orders_by_category_then_position() {
        let ingestor = Ingestor::new(GraphStore::in_memory());
        let prepared = ingestor
            .prepare(&request(
                "S1",
                "TODO: rerun backtest\nDECISION: use 60-day lookback\nINSIGHT: noise drops",
            ))
            .unwrap();
        let order: Vec<NodeType> = prepared
            .accepted
            .iter()
            .map(|s| s.candidate.category)
            .collect();
        assert_eq!(
            order,
            vec![NodeType::Insight, NodeType::Decision, NodeType::ActionItem]
        );
        assert!(prepared.accepted.iter().all(|s| (0.0..=1.0).contains(&s.importance)));
    }

    #[test]
    fn test_prepare_rejects_empty_session() {
        let ingestor = Ingestor::new(GraphStore::in_memory());
        assert!(matches!(
            ingestor.prepare(&request("  ", "DECISION: x y z")),
            Err(GraphError::Validation(_))
        ));
    }

    #[test]
    fn test_check_candidate_reasons() {
        let candidate = Candidate {
            category: NodeType::Insight,
            content: "strange weight".into(),
            confidence: 1.5,
            trigger: "odd".into(),
            span: 0..20,
        };
        let err = check_candidate(&candidate).unwrap_err();
        assert!(err.to_string().contains("confidence"));

        let blank = Candidate {
            content: "   ".into(),
            confidence: 0.5,
            ..candidate
        };
        assert_eq!(check_candidate(&blank), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn test_custom_extractor() {
        let table = PatternTable::empty()
            .with_rule(PatternRule::new(NodeType::Decision, "agreed", r"\bwe agreed to\b", 0.7))
            .unwrap();
        let store = GraphStore::in_memory();
        let ingestor = Ingestor::new(store.clone())
            .with_extractor(Extractor::new(table, ExtractorConfig::default()));

        let report = ingestor
            .ingest(&request("S1", "DECISION: ignored here
we agreed to freeze the schema"))
            .unwrap();
        assert_eq!(report.created.len(), 1);
        let node = store.node(&report.created[0]).unwrap().unwrap();
        assert_eq!(node.content, "freeze the schema");
        assert_eq!(node.properties[props::TRIGGER], "agreed");
    }

    #[test]
    fn test_node_properties() {
        let store = GraphStore::in_memory();
        let ingestor = Ingestor::new(store.clone());
        let context = IngestContext::new("S1")
            .with_conversation("conv-9")
            .with_attribution(Attribution {
                user_id: Some("u1".into()),
                channel_id: None,
            });
        let report = ingestor
            .ingest(&IngestRequest::new(context.clone(), "DECISION: ship the parser"))
            .unwrap();

        let node = store.node(&report.created[0]).unwrap().unwrap();
        assert_eq!(node.node_type, NodeType::Decision);
        assert_eq!(node.source_conversation_id.as_deref(), Some("conv-9"));
        assert_eq!(node.properties[props::USER_ID], "u1");
        assert!(!node.properties.contains_key(props::CHANNEL_ID));
        assert_eq!(node.properties[props::SESSION_ID], "S1");
        assert_eq!(node.properties[props::INGEST_SEQ], 0);
        assert_eq!(node.created_at, context.timestamp);
        assert!(node.importance() > 0.0);
    }

    #[test]
    fn test_created_at_stays_at_max_timestamp() {
        let scored = ScoredCandidate {
            candidate: Candidate {
                category: NodeType::Insight,
                content: "the clock ran out".to_string(),
                confidence: 0.8,
                trigger: "insight".to_string(),
                span: 0..26,
            },
            importance: 0.5,
        };
        let context = IngestContext::new("S1").with_timestamp(chrono::DateTime::<chrono::Utc>::MAX_UTC);
        let node = candidate_node(&scored, &context, 3);
        assert_eq!(node.created_at, chrono::DateTime::<chrono::Utc>::MAX_UTC);
    }

    #[test]
    fn test_reingest_merges() {
        let store = GraphStore::in_memory();
        let ingestor = Ingestor::new(store.clone());
        let req = request("S1", "DECISION: use 60-day lookback\nINSIGHT: noise drops");

        let first = ingestor.ingest(&req).unwrap();
        assert_eq!(first.created.len(), 2);
        assert!(first.edges_created > 0);
        let stats = store.stats().unwrap();

        let second = ingestor.ingest(&req).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.merged.len(), 2);
        assert_eq!(second.edges_created, 0);
        assert_eq!(store.stats().unwrap(), stats);
    }

    #[test]
    fn test_no_triggers_still_records_session() {
        let store = GraphStore::in_memory();
        let report = Ingestor::new(store.clone())
            .ingest(&request("S1", "just chatting about lunch"))
            .unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.session_node_id, "session:S1");
        assert!(store.node("session:S1").unwrap().is_some());
    }

    #[test]
    fn test_ingest_many_commits_each_request() {
        let store = GraphStore::in_memory();
        let ingestor = Ingestor::new(store.clone());
        let requests = vec![
            request("S1", "DECISION: adopt the new cache"),
            request("", "DECISION: never stored"),
            request("S2", "INSIGHT: cold starts dominate latency"),
        ];

        let results = ingestor.ingest_many(&requests);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().created.len(), 1);
        assert!(matches!(results[1], Err(GraphError::Validation(_))));
        assert_eq!(results[2].as_ref().unwrap().created.len(), 1);
        assert!(store.node("session:S2").unwrap().is_some());
    }
}

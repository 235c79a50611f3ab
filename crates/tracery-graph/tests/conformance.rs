//! Backend conformance suite.
//!
//! Every check runs against both the native and the SQLite backend, and a
//! final group asserts both return identical results for identical data.

mod common;

use anyhow::Result;
use common::{at, node};
use tracery_graph::{
    EdgeWrite, GraphError, GraphStore, RelationshipFilter, WriteOptions, dedup::dedup_key,
};
use tracery_types::{Direction, Edge, Node, NodeType, RelationshipType, props};

mod checks {
    use super::*;

    pub fn test_create_and_get_node(store: &GraphStore) -> Result<()> {
        let n = node("n1", NodeType::Decision, "use 60-day lookback", 0)
            .with_confidence(0.7)
            .with_property(props::IMPORTANCE, 0.62)
            .with_source_conversation("conv-1");
        store.create_node(&n)?;

        let loaded = store.node("n1")?.expect("node should exist");
        assert_eq!(loaded, n);
        assert!(store.node("missing")?.is_none());
        Ok(())
    }

    pub fn test_create_node_conflict(store: &GraphStore) -> Result<()> {
        store.create_node(&node("n1", NodeType::Insight, "alpha", 0))?;
        let err = store
            .create_node(&node("n1", NodeType::Insight, "beta", 1))
            .unwrap_err();
        assert!(matches!(err, GraphError::Conflict(_)));
        Ok(())
    }

    pub fn test_upsert_merges(store: &GraphStore) -> Result<()> {
        let first = node("n1", NodeType::Insight, "Noise drops", 0)
            .with_confidence(0.4)
            .with_property(props::IMPORTANCE, 0.3)
            .with_property(props::TRIGGER, "insight");
        let second = node("n2", NodeType::Insight, "noise   DROPS", 5)
            .with_confidence(0.8)
            .with_property(props::IMPORTANCE, 0.5)
            .with_property(props::TRIGGER, "key_insight")
            .with_property(props::USER_ID, "u1");

        let created = store.upsert_node(&first, &dedup_key(&first.content))?;
        assert!(created.created);
        let merged = store.upsert_node(&second, &dedup_key(&second.content))?;
        assert!(!merged.created);
        assert_eq!(merged.id, "n1");

        let stored = store.node("n1")?.expect("merged node");
        assert_eq!(stored.confidence, 0.8);
        assert_eq!(stored.importance(), 0.5);
        assert_eq!(stored.properties[props::TRIGGER], "insight");
        assert_eq!(stored.properties[props::USER_ID], "u1");
        assert_eq!(stored.created_at, at(0));
        assert!(store.node("n2")?.is_none());
        assert_eq!(store.stats()?.node_count, 1);
        Ok(())
    }

    pub fn test_create_edge_idempotent(store: &GraphStore) -> Result<()> {
        store.create_node(&node("d", NodeType::Decision, "decide", 0))?;
        store.create_node(&node("i", NodeType::Insight, "learn", 1))?;

        let edge = Edge::new("d", "i", RelationshipType::WasInformedBy);
        let first = store.create_edge(&edge)?;
        let again = store.create_edge(&Edge::new("d", "i", RelationshipType::WasInformedBy))?;
        assert!(matches!(first, EdgeWrite::Created(_)));
        assert_eq!(again, EdgeWrite::Existing(first.id().clone()));
        assert_eq!(store.stats()?.edge_count, 1);

        // a different relationship between the same nodes is a new edge
        store.create_edge(&Edge::new("d", "i", RelationshipType::References))?;
        assert_eq!(store.stats()?.edge_count, 2);
        Ok(())
    }

    pub fn test_create_edge_missing_endpoint(store: &GraphStore) -> Result<()> {
        store.create_node(&node("d", NodeType::Decision, "decide", 0))?;
        let err = store
            .create_edge(&Edge::new("d", "ghost", RelationshipType::WasInformedBy))
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
        assert_eq!(store.stats()?.edge_count, 0);
        Ok(())
    }

    pub fn test_self_loop_rejected(store: &GraphStore) -> Result<()> {
        store.create_node(&node("d", NodeType::Decision, "decide", 0))?;
        let err = store
            .create_edge(&Edge::new("d", "d", RelationshipType::WasInformedBy))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        Ok(())
    }

    pub fn test_invalid_node_rejected(store: &GraphStore) -> Result<()> {
        let err = store
            .create_node(&node("n", NodeType::Insight, "fine", 0).with_confidence(1.2))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        let err = store
            .create_node(&node("m", NodeType::Insight, "   ", 0))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        assert_eq!(store.stats()?.node_count, 0);
        Ok(())
    }

    pub fn test_neighbors_directions(store: &GraphStore) -> Result<()> {
        for (id, minutes) in [("a", 0), ("b", 1), ("c", 2)] {
            store.create_node(&node(id, NodeType::Insight, &format!("node {}", id), minutes))?;
        }
        store.create_edge(&Edge::new("a", "b", RelationshipType::WasInformedBy))?;
        store.create_edge(&Edge::new("c", "b", RelationshipType::References))?;

        let ids = |dir, rel| -> Result<Vec<String>> {
            Ok(store
                .neighbors("b", rel, dir)?
                .map(|n| n.map(|n| n.id))
                .collect::<tracery_graph::Result<Vec<_>>>()?)
        };
        assert_eq!(ids(Direction::Incoming, None)?, vec!["a", "c"]);
        assert!(ids(Direction::Outgoing, None)?.is_empty());
        assert_eq!(
            ids(Direction::Both, Some(RelationshipType::References))?,
            vec!["c"]
        );
        Ok(())
    }

    pub fn test_traverse_breadth_first(store: &GraphStore) -> Result<()> {
        // a -> b -> d, a -> c, c -> d
        for (id, minutes) in [("a", 0), ("b", 1), ("c", 2), ("d", 3)] {
            store.create_node(&node(id, NodeType::Insight, &format!("node {}", id), minutes))?;
        }
        for (from, to) in [("a", "b"), ("b", "d"), ("a", "c"), ("c", "d")] {
            store.create_edge(&Edge::new(from, to, RelationshipType::WasInformedBy))?;
        }

        let filter = RelationshipFilter::new([RelationshipType::WasInformedBy], Direction::Outgoing);
        let reached: Vec<(String, usize)> = store
            .traverse("a", 5, filter)?
            .map(|step| step.map(|(n, depth)| (n.id, depth)))
            .collect::<tracery_graph::Result<_>>()?;
        assert_eq!(
            reached,
            vec![
                ("b".to_string(), 1),
                ("c".to_string(), 1),
                ("d".to_string(), 2)
            ]
        );
        Ok(())
    }

    pub fn test_search_case_insensitive(store: &GraphStore) -> Result<()> {
        store.create_node(&node("n1", NodeType::Insight, "Überprüfung der Daten", 0))?;
        store.create_node(&node("n2", NodeType::Decision, "Use the LOOKBACK", 1))?;
        store.create_node(&node("n3", NodeType::Insight, "nothing here", 2))?;

        let hits: Vec<String> = store.search("überprüfung")?.into_iter().map(|n| n.id).collect();
        assert_eq!(hits, vec!["n1"]);
        let hits: Vec<String> = store.search("lookback")?.into_iter().map(|n| n.id).collect();
        assert_eq!(hits, vec!["n2"]);
        assert!(store.search("absent")?.is_empty());
        Ok(())
    }

    pub fn test_archive_hides_from_search(store: &GraphStore) -> Result<()> {
        store.create_node(&node("n1", NodeType::Insight, "cache warmup", 0))?;
        store.archive_node("n1")?;
        assert!(store.search("cache")?.is_empty());
        assert!(store.node("n1")?.expect("still stored").is_archived());
        Ok(())
    }

    pub fn test_list_order(store: &GraphStore) -> Result<()> {
        store.create_node(&node("s", NodeType::Insight, "third", 2))?;
        store.create_node(&node("q", NodeType::Insight, "first", 0))?;
        store.create_node(&node("r", NodeType::Insight, "second", 0))?;

        let ids: Vec<String> = store
            .nodes_of_type(NodeType::Insight)?
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["q", "r", "s"]);
        Ok(())
    }

    pub fn test_failed_write_rolls_back(store: &GraphStore) -> Result<()> {
        let result: tracery_graph::Result<()> = store.write(&WriteOptions::default(), |w| {
            w.create_node(&node("n1", NodeType::Insight, "kept?", 0), "k1")?;
            w.create_edge(&Edge::new("n1", "ghost", RelationshipType::References))?;
            Ok(())
        });
        assert!(matches!(result, Err(GraphError::NotFound(_))));
        assert!(store.node("n1")?.is_none());
        assert_eq!(store.stats()?.node_count, 0);
        Ok(())
    }

    pub fn test_session_and_file_lookups(store: &GraphStore) -> Result<()> {
        store.create_node(&Node::session("S1").with_created_at(at(0)))?;
        store.create_node(&Node::file("risk.py").with_created_at(at(0)))?;
        store.create_node(&node("d", NodeType::Decision, "change risk.py", 1))?;
        store.create_node(&node("i", NodeType::Insight, "risk.py is slow", 2))?;
        for edge in [
            Edge::new("d", "session:S1", RelationshipType::WasDiscussedIn),
            Edge::new("i", "session:S1", RelationshipType::WasDiscussedIn),
            Edge::new("d", "file:risk.py", RelationshipType::Modifies),
            Edge::new("i", "file:risk.py", RelationshipType::References),
        ] {
            store.create_edge(&edge)?;
        }

        let session: Vec<String> = store.session_nodes("S1")?.into_iter().map(|n| n.id).collect();
        assert_eq!(session, vec!["d", "i"]);
        let history: Vec<String> = store.file_history("risk.py")?.into_iter().map(|n| n.id).collect();
        assert_eq!(history, vec!["d"]);
        Ok(())
    }
}

macro_rules! conformance_suite {
    ($backend:ident: $($check:ident),* $(,)?) => {
        mod $backend {
            use super::*;

            $(
                #[test]
                fn $check() -> Result<()> {
                    let graph = common::$backend()?;
                    checks::$check(&graph.store)
                }
            )*

            #[test]
            fn test_reopen_keeps_data() -> Result<()> {
                let graph = common::$backend()?;
                graph.store.create_node(&node("n1", NodeType::Insight, "persisted", 0))?;
                graph.store.create_node(&node("n2", NodeType::Decision, "also persisted", 1))?;
                graph
                    .store
                    .create_edge(&Edge::new("n2", "n1", RelationshipType::WasInformedBy))?;
                let before = graph.store.analytics(5)?;
                drop(graph.store);

                let reopened = GraphStore::open(graph.kind, Some(&graph.path))?;
                assert_eq!(reopened.analytics(5)?, before);
                assert_eq!(
                    reopened.node("n1")?.expect("node survives reopen").content,
                    "persisted"
                );
                Ok(())
            }
        }
    };
}

conformance_suite!(native:
    test_create_and_get_node,
    test_create_node_conflict,
    test_upsert_merges,
    test_create_edge_idempotent,
    test_create_edge_missing_endpoint,
    test_self_loop_rejected,
    test_invalid_node_rejected,
    test_neighbors_directions,
    test_traverse_breadth_first,
    test_search_case_insensitive,
    test_archive_hides_from_search,
    test_list_order,
    test_failed_write_rolls_back,
    test_session_and_file_lookups,
);

conformance_suite!(sqlite:
    test_create_and_get_node,
    test_create_node_conflict,
    test_upsert_merges,
    test_create_edge_idempotent,
    test_create_edge_missing_endpoint,
    test_self_loop_rejected,
    test_invalid_node_rejected,
    test_neighbors_directions,
    test_traverse_breadth_first,
    test_search_case_insensitive,
    test_archive_hides_from_search,
    test_list_order,
    test_failed_write_rolls_back,
    test_session_and_file_lookups,
);

// ─────────────────────────────────────────────────────────────────────────────
// Cross-backend equivalence
// ─────────────────────────────────────────────────────────────────────────────

fn populate(store: &GraphStore) -> Result<()> {
    let nodes = [
        node("i1", NodeType::Insight, "longer windows reduce noise", 0),
        node("i2", NodeType::Insight, "Noise hides regime shifts", 1),
        node("d1", NodeType::Decision, "use 60-day lookback", 2).with_confidence(0.7),
        node("a1", NodeType::ActionItem, "update the lookback in risk.py", 3),
        Node::session("S1").with_created_at(at(0)),
        Node::file("risk.py").with_created_at(at(0)),
    ];
    for n in &nodes {
        store.create_node(n)?;
    }
    let edges = [
        ("d1", "i1", RelationshipType::WasInformedBy),
        ("i1", "i2", RelationshipType::WasInformedBy),
        ("a1", "d1", RelationshipType::ResultsFrom),
        ("a1", "file:risk.py", RelationshipType::Modifies),
        ("d1", "session:S1", RelationshipType::WasDiscussedIn),
        ("i1", "session:S1", RelationshipType::WasDiscussedIn),
    ];
    for (i, (from, to, rel)) in edges.into_iter().enumerate() {
        store.create_edge(&Edge::new(from, to, rel).with_created_at(at(10 + i as i64)))?;
    }
    store.archive_node("i2")?;
    Ok(())
}

#[test]
fn test_backends_agree() -> Result<()> {
    let native = common::native()?;
    let sqlite = common::sqlite()?;
    populate(&native.store)?;
    populate(&sqlite.store)?;

    let ids = |nodes: Vec<Node>| nodes.into_iter().map(|n| n.id).collect::<Vec<_>>();

    for keyword in ["noise", "LOOKBACK", "risk", "zzz"] {
        assert_eq!(
            ids(native.store.search(keyword)?),
            ids(sqlite.store.search(keyword)?),
            "search {:?}",
            keyword
        );
    }
    assert_eq!(
        ids(native.store.session_nodes("S1")?),
        ids(sqlite.store.session_nodes("S1")?)
    );
    assert_eq!(
        ids(native.store.file_history("risk.py")?),
        ids(sqlite.store.file_history("risk.py")?)
    );
    assert_eq!(native.store.analytics(10)?, sqlite.store.analytics(10)?);

    for start in ["a1", "d1", "session:S1"] {
        let walk = |store: &GraphStore| -> Result<Vec<(String, usize)>> {
            Ok(store
                .traverse(start, 4, RelationshipFilter::any())?
                .map(|s| s.map(|(n, d)| (n.id, d)))
                .collect::<tracery_graph::Result<_>>()?)
        };
        assert_eq!(walk(&native.store)?, walk(&sqlite.store)?, "traverse {}", start);
    }

    for id in ["i1", "i2", "d1", "a1", "session:S1", "file:risk.py"] {
        assert_eq!(native.store.node(id)?, sqlite.store.node(id)?, "node {}", id);
    }
    Ok(())
}

//! Atomicity, timeout and cancellation behavior under concurrent use.

mod common;

use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use common::{TestGraph, node};
use tracery_graph::{CancelFlag, GraphError, GraphStore, Ingestor, WriteOptions};
use tracery_types::{Direction, IngestContext, IngestRequest, NodeType, RelationshipType};

/// Every knowledge node a reader can see must already carry its provenance
/// edge; a reader that sees one without the other observed a partial batch.
fn assert_no_partial_batches(store: &GraphStore) -> Result<()> {
    let view = store.view()?;
    for node_type in NodeType::KNOWLEDGE {
        for n in view.scan_nodes(&tracery_graph::NodeFilter::of_types([node_type]))? {
            let provenance =
                view.edges_of(&n.id, Some(RelationshipType::WasDiscussedIn), Direction::Outgoing)?;
            assert_eq!(provenance.len(), 1, "node {} has no provenance", n.id);
        }
    }
    Ok(())
}

fn readers_never_see_partial_batches(graph: TestGraph) -> Result<()> {
    let store = graph.store.clone();
    let done = AtomicBool::new(false);

    thread::scope(|scope| -> Result<()> {
        let writer = scope.spawn(|| -> Result<()> {
            let ingestor = Ingestor::new(store.clone());
            for i in 0..25 {
                ingestor.ingest(&IngestRequest::new(
                    IngestContext::new(format!("S{}", i % 3)).with_file("risk.py"),
                    format!(
                        "INSIGHT: observation number {i} about risk\n\
                         DECISION: adjust threshold {i} in risk.py\n\
                         TODO: verify run {i}"
                    ),
                ))?;
            }
            done.store(true, Ordering::SeqCst);
            Ok(())
        });

        let readers: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| -> Result<()> {
                    while !done.load(Ordering::SeqCst) {
                        assert_no_partial_batches(&store)?;
                    }
                    Ok(())
                })
            })
            .collect();

        writer.join().map_err(|_| anyhow::anyhow!("writer panicked"))??;
        for reader in readers {
            reader.join().map_err(|_| anyhow::anyhow!("reader panicked"))??;
        }
        Ok(())
    })?;

    assert_eq!(graph.store.nodes_of_type(NodeType::Decision)?.len(), 25);
    assert_no_partial_batches(&graph.store)
}

fn write_times_out_while_writer_busy(graph: TestGraph) -> Result<()> {
    let store = graph.store.clone();
    let started = Barrier::new(2);
    let release = Barrier::new(2);

    thread::scope(|scope| -> Result<()> {
        let holder = scope.spawn(|| {
            store.write(&WriteOptions::new(Duration::from_secs(5)), |w| {
                w.create_node(&node("slow", NodeType::Insight, "slow writer", 0), "slow")?;
                started.wait();
                release.wait();
                Ok(())
            })
        });

        started.wait();
        let quick = WriteOptions::new(Duration::from_millis(50));
        let result = store.write(&quick, |w| {
            w.create_node(&node("fast", NodeType::Insight, "fast writer", 1), "fast")
        });
        release.wait();

        assert!(matches!(result, Err(GraphError::Timeout(_))), "{:?}", result);
        holder.join().map_err(|_| anyhow::anyhow!("holder panicked"))??;
        Ok(())
    })?;

    assert!(graph.store.node("slow")?.is_some());
    assert!(graph.store.node("fast")?.is_none());
    Ok(())
}

fn cancelled_write_leaves_graph_unchanged(graph: TestGraph) -> Result<()> {
    let store = &graph.store;
    store.create_node(&node("base", NodeType::Insight, "baseline", 0))?;
    let before = store.stats()?;

    let cancel = CancelFlag::new();
    let options = WriteOptions::default().with_cancel(cancel.clone());
    let result = store.write(&options, |w| {
        w.create_node(&node("n1", NodeType::Decision, "first", 1), "k1")?;
        cancel.cancel();
        w.create_node(&node("n2", NodeType::Decision, "second", 2), "k2")?;
        Ok(())
    });

    assert!(matches!(result, Err(GraphError::Cancelled)));
    assert_eq!(store.stats()?, before);
    assert!(store.node("n1")?.is_none());

    // a flag cancelled up front stops the write before it starts
    let result = store.write(&options, |_| Ok(()));
    assert!(matches!(result, Err(GraphError::Cancelled)));
    Ok(())
}

fn failed_ingest_rolls_back(graph: TestGraph) -> Result<()> {
    let store = &graph.store;
    let cancel = CancelFlag::new();
    cancel.cancel();

    let ingestor = Ingestor::new(store.clone());
    let result = ingestor.ingest_with(
        &IngestRequest::new(IngestContext::new("S1"), "DECISION: never lands"),
        &WriteOptions::default().with_cancel(cancel),
    );
    assert!(matches!(result, Err(GraphError::Cancelled)));
    assert_eq!(store.stats()?.node_count, 0);
    Ok(())
}

macro_rules! concurrency_suite {
    ($backend:ident) => {
        mod $backend {
            use super::*;

            #[test]
            fn test_readers_never_see_partial_batches() -> Result<()> {
                readers_never_see_partial_batches(common::$backend()?)
            }

            #[test]
            fn test_write_times_out_while_writer_busy() -> Result<()> {
                write_times_out_while_writer_busy(common::$backend()?)
            }

            #[test]
            fn test_cancelled_write_leaves_graph_unchanged() -> Result<()> {
                cancelled_write_leaves_graph_unchanged(common::$backend()?)
            }

            #[test]
            fn test_failed_ingest_rolls_back() -> Result<()> {
                failed_ingest_rolls_back(common::$backend()?)
            }
        }
    };
}

concurrency_suite!(native);
concurrency_suite!(sqlite);

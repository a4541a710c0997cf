//! Property-based tests for graph ordering and change-set invariants.
//!
//! Graphs are generated acyclic by only letting node `i` reference nodes
//! with a lower index; declaration order is optionally reversed so the
//! builder cannot rely on it.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use strata::error::{GraphError, StrataError};
use strata::graph::{Graph, GraphBuilder};
use strata::planner::{Action, CancelSignal, ChangeSetExecutor, PlanOptions, Planner};
use strata::provider::{Operation, ProviderContext, SimulatedProvider};
use strata::resource::{Attributes, ResourceNode, Value};
use strata::state::{MemoryStateStore, StateRecord};

// ============================================================================
// Generators
// ============================================================================

/// Edges as `(from, to)` with `to < from`.
fn dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, bool)> {
    (1usize..10).prop_flat_map(|n| {
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|from| (0..from).map(move |to| (from, to)))
            .collect();
        let len = pairs.len();
        (
            Just(n),
            proptest::sample::subsequence(pairs, 0..=len),
            any::<bool>(),
        )
    })
}

fn name(i: usize) -> String {
    format!("n{i}")
}

fn nodes(
    n: usize,
    edges: &[(usize, usize)],
    reversed: bool,
    failing: Option<usize>,
) -> Vec<ResourceNode> {
    let mut nodes: Vec<ResourceNode> = (0..n)
        .map(|i| {
            let kind = if Some(i) == failing { "fragile" } else { "thing" };
            edges
                .iter()
                .filter(|(from, _)| *from == i)
                .fold(ResourceNode::new(name(i), kind), |node, (_, to)| {
                    node.with_property(format!("ref_{to}"), Value::id_of(name(*to)))
                })
        })
        .collect();
    if reversed {
        nodes.reverse();
    }
    nodes
}

fn build(n: usize, edges: &[(usize, usize)], reversed: bool) -> Graph {
    GraphBuilder::new()
        .build_nodes(nodes(n, edges, reversed, None))
        .unwrap()
}

fn records_for(graph: &Graph) -> Vec<StateRecord> {
    graph
        .nodes()
        .iter()
        .map(|node| StateRecord::new(node, format!("id-{}", node.logical_name), Attributes::new()))
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn topological_order_respects_every_edge((n, edges, reversed) in dag()) {
        let graph = build(n, &edges, reversed);
        let order: Vec<&str> = graph
            .topological_order()
            .iter()
            .map(|node| node.logical_name.as_str())
            .collect();

        prop_assert_eq!(order.len(), n);
        for (from, to) in &edges {
            let dependent = order.iter().position(|x| *x == name(*from)).unwrap();
            let dependency = order.iter().position(|x| *x == name(*to)).unwrap();
            prop_assert!(dependency < dependent);
        }
    }

    #[test]
    fn creates_follow_dependencies((n, edges, reversed) in dag()) {
        let graph = build(n, &edges, reversed);
        let changes = Planner::new().plan(&graph, &[], &PlanOptions::default()).unwrap();

        prop_assert_eq!(changes.count(Action::Create), n);
        for (from, to) in &edges {
            let dependent = changes.position(&name(*from), Action::Create).unwrap();
            let dependency = changes.position(&name(*to), Action::Create).unwrap();
            prop_assert!(dependency < dependent);
            prop_assert!(changes.entries[dependent].requires.contains(&dependency));
        }
    }

    #[test]
    fn replanning_applied_state_is_empty((n, edges, reversed) in dag()) {
        let graph = build(n, &edges, reversed);
        let changes = Planner::new()
            .plan(&graph, &records_for(&graph), &PlanOptions::default())
            .unwrap();

        prop_assert!(changes.is_empty());
        prop_assert_eq!(changes.count(Action::NoOp), n);
    }

    #[test]
    fn deletes_never_remove_a_dependency_first((n, edges, reversed) in dag()) {
        let graph = build(n, &edges, reversed);
        let changes = Planner::new().plan_destroy(&records_for(&graph)).unwrap();

        prop_assert_eq!(changes.count(Action::Delete), n);
        for (from, to) in &edges {
            let dependent = changes.position(&name(*from), Action::Delete).unwrap();
            let dependency = changes.position(&name(*to), Action::Delete).unwrap();
            prop_assert!(dependent < dependency);
        }
    }

    #[test]
    fn closing_a_chain_is_a_cycle(n in 2usize..8) {
        let mut chain: Vec<(usize, usize)> = (1..n).map(|i| (i, i - 1)).collect();
        chain.push((0, n - 1));
        let declared = nodes(n, &chain, false, None);

        let err = GraphBuilder::new().build_nodes(declared).unwrap_err();
        match err {
            StrataError::Graph(GraphError::Cycle { cycle }) => {
                prop_assert_eq!(cycle.len(), n + 1);
                prop_assert_eq!(cycle.first(), cycle.last());
            }
            other => prop_assert!(false, "expected a cycle, got {}", other),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn failure_blocks_exactly_the_descendants(
        (n, edges, reversed) in dag(),
        pick in any::<prop::sample::Index>(),
    ) {
        let failing = pick.index(n);
        let graph = GraphBuilder::new()
            .build_nodes(nodes(n, &edges, reversed, Some(failing)))
            .unwrap();
        let blocked: BTreeSet<String> = graph
            .descendants(&name(failing))
            .into_iter()
            .map(String::from)
            .collect();
        let changes = Planner::new().plan(&graph, &[], &PlanOptions::default()).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = runtime.block_on(async {
            let provider = Arc::new(SimulatedProvider::new());
            provider.fail_on(Operation::Create, "fragile").await;
            ChangeSetExecutor::new(provider, Arc::new(MemoryStateStore::new()), ProviderContext::new("test-1"))
                .execute(&changes, &CancelSignal::never())
                .await
                .unwrap()
        });

        let failing_name = name(failing);
        prop_assert_eq!(report.failed_names(), vec![failing_name.as_str()]);
        let skipped: BTreeSet<String> = report.skipped_names().into_iter().map(String::from).collect();
        prop_assert_eq!(&skipped, &blocked);
        prop_assert_eq!(report.applied.len(), n - 1 - blocked.len());
        for applied in report.applied_names() {
            prop_assert!(!blocked.contains(applied));
        }
    }
}

//! Property-based tests for dependency graph invariants.
//!
//! These tests verify the behavioral contracts of the graph:
//! - Topological sort respects all dependencies
//! - The dependency and dependent maps stay exact inverses
//! - Cycle rejection is accurate and leaves the graph untouched
//! - Earlier graph values are never changed by later mutations

use keel_graph::{DependencyGraph, Error, TopoComparator, graph, topo_comparator, topo_sort};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// A generated acyclic graph: every node name plus its `(node, dependency)` edges.
///
/// Names without edges are kept so tests can check they never reach the graph.
#[derive(Debug, Clone)]
struct Dag {
    names: Vec<String>,
    edges: Vec<(String, String)>,
}

fn node_name(index: usize) -> String {
    format!("svc{index:02}")
}

/// Generate a DAG as an edge list over `2..=max_nodes` nodes.
///
/// Each edge points from a node to one with a lower index, so no edge list
/// can contain a cycle.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Dag> {
    (2..=max_nodes).prop_flat_map(|count| {
        let edge = (1..count).prop_flat_map(|node| (Just(node), 0..node));
        proptest::collection::vec(edge, 0..count * 2).prop_map(move |pairs| {
            let mut seen = HashSet::new();
            let edges = pairs
                .into_iter()
                .filter(|pair| seen.insert(*pair))
                .map(|(node, dep)| (node_name(node), node_name(dep)))
                .collect();
            Dag {
                names: (0..count).map(node_name).collect(),
                edges,
            }
        })
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn build_graph(dag: &Dag) -> Result<DependencyGraph<String>, Error> {
    dag.edges
        .iter()
        .try_fold(graph(), |g, (node, dep)| g.depend(node.clone(), dep.clone()))
}

/// Check that every recorded edge appears in both directions.
fn assert_inverse(g: &DependencyGraph<String>) -> Result<(), TestCaseError> {
    for node in g.nodes() {
        for dep in g.immediate_dependencies(&node) {
            prop_assert!(
                g.immediate_dependents(&dep).contains(&node),
                "'{}' depends on '{}' but is not listed as its dependent",
                node,
                dep
            );
        }
        for dependent in g.immediate_dependents(&node) {
            prop_assert!(
                g.immediate_dependencies(&dependent).contains(&node),
                "'{}' is listed as dependent of '{}' without the matching dependency",
                dependent,
                node
            );
        }
    }
    Ok(())
}

// =============================================================================
// Property Tests: Topological Sort
// =============================================================================

proptest! {
    /// Contract: Topological sort respects dependencies.
    ///
    /// For every node A that depends on node B, B must appear before A
    /// in the topologically sorted output.
    #[test]
    fn topological_sort_respects_dependencies(dag in dag_strategy(15)) {
        let g = build_graph(&dag).expect("Graph should build successfully");
        let sorted = topo_sort(&g);

        let positions: HashMap<&String, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        for (name, dep) in &dag.edges {
            let node_pos = positions.get(name).expect("Node should be in sorted output");
            let dep_pos = positions.get(dep).expect("Dependency should be in sorted output");
            prop_assert!(
                dep_pos < node_pos,
                "Dependency '{}' (pos {}) should come before '{}' (pos {})",
                dep, dep_pos, name, node_pos
            );
        }
    }

    /// Contract: Topological sort contains every node exactly once.
    #[test]
    fn topological_sort_includes_all_nodes(dag in dag_strategy(20)) {
        let g = build_graph(&dag).expect("Graph should build successfully");
        let sorted = topo_sort(&g);

        let unique: HashSet<&String> = sorted.iter().collect();
        prop_assert_eq!(unique.len(), sorted.len(), "No node may appear twice");
        prop_assert_eq!(sorted.len(), g.nodes().len());

        let endpoints: HashSet<&String> =
            dag.edges.iter().flat_map(|(node, dep)| [node, dep]).collect();
        prop_assert_eq!(unique, endpoints);
    }

    /// Contract: petgraph agrees the exported graph is a DAG.
    #[test]
    fn exported_digraph_is_acyclic(dag in dag_strategy(15)) {
        let g = build_graph(&dag).expect("Graph should build successfully");
        let digraph = g.to_digraph();

        prop_assert!(!petgraph::algo::is_cyclic_directed(&digraph));
        prop_assert_eq!(digraph.edge_count(), dag.edges.len());
        prop_assert!(petgraph::algo::toposort(&digraph, None).is_ok());
    }

    /// Contract: Topological sort is deterministic for the same construction.
    #[test]
    fn topological_sort_is_deterministic(dag in dag_strategy(10)) {
        let g1 = build_graph(&dag).expect("Graph 1 should build");
        let g2 = build_graph(&dag).expect("Graph 2 should build");
        prop_assert_eq!(topo_sort(&g1), topo_sort(&g2));
    }
}

// =============================================================================
// Property Tests: Comparator
// =============================================================================

proptest! {
    /// Contract: Sorting by the comparator puts every transitive dependency first,
    /// and unknown nodes last.
    #[test]
    fn comparator_orders_transitive_dependencies(dag in dag_strategy(12)) {
        let g = build_graph(&dag).expect("Graph should build");

        let mut items: Vec<String> = vec!["unknown_b".to_string()];
        items.extend(dag.names.iter().rev().cloned());
        items.push("unknown_a".to_string());
        items.sort_by(topo_comparator(&g));

        let position = |name: &str| items.iter().position(|item| item == name);
        for name in &dag.names {
            for dep in g.transitive_dependencies(name) {
                prop_assert!(position(&dep) < position(name));
            }
        }

        let comparator = TopoComparator::new(&g);
        let known = items.iter().filter(|item| comparator.rank(*item) != usize::MAX).count();
        let tail: Vec<&str> = items[known..].iter().map(String::as_str).collect();
        let expected_tail: Vec<&str> = dag
            .names
            .iter()
            .rev()
            .map(String::as_str)
            .filter(|name| !g.contains(*name))
            .collect();
        prop_assert_eq!(tail.first().copied(), Some("unknown_b"));
        prop_assert_eq!(tail.last().copied(), Some("unknown_a"));
        prop_assert_eq!(&tail[1..tail.len() - 1], expected_tail.as_slice());
    }
}

// =============================================================================
// Property Tests: Cycles and Invariants
// =============================================================================

proptest! {
    /// Contract: No node ever transitively depends on itself, and closing
    /// any existing path into a cycle is rejected without touching the graph.
    #[test]
    fn closing_a_path_is_rejected(dag in dag_strategy(12)) {
        let g = build_graph(&dag).expect("Graph should build");

        for node in g.nodes() {
            prop_assert!(!g.depends_on(&node, &node));
            for dep in g.transitive_dependencies(&node) {
                let err = g.depend(dep.clone(), node.clone()).expect_err("cycle must be rejected");
                prop_assert_eq!(
                    err.to_string(),
                    format!("Circular dependency between {dep} and {node}")
                );
            }
        }
        prop_assert_eq!(build_graph(&dag).expect("rebuild"), g);
    }

    /// Contract: The dependency and dependent maps remain inverses after
    /// any mix of additions and removals.
    #[test]
    fn maps_stay_inverse_under_removal(
        dag in dag_strategy(12),
        picks in proptest::collection::vec((0..3_u8, any::<proptest::sample::Index>()), 0..8)
    ) {
        let mut g = build_graph(&dag).expect("Graph should build");
        assert_inverse(&g)?;

        for (op, index) in picks {
            let names: Vec<String> = g.nodes().into_iter().collect();
            if names.is_empty() {
                break;
            }
            let node = index.get(&names).clone();
            g = match op {
                0 => {
                    let deps: Vec<String> = g.immediate_dependencies(&node).into_iter().collect();
                    match deps.first() {
                        Some(dep) => g.remove_edge(&node, dep),
                        None => g,
                    }
                }
                1 => g.remove_node(&node),
                _ => {
                    let next = g.remove_all(&node);
                    prop_assert!(!next.nodes().contains(&node));
                    next
                }
            };
            assert_inverse(&g)?;
        }
    }

    /// Contract: Mutating a graph never changes graphs handed out earlier.
    #[test]
    fn earlier_graphs_are_unchanged(dag in dag_strategy(12)) {
        let g = build_graph(&dag).expect("Graph should build");
        let snapshot_nodes = g.nodes();
        let snapshot_edges = g.edge_count();

        let mut later = g.clone();
        for node in snapshot_nodes.iter().take(3) {
            later = later.remove_all(node);
        }
        later = later.depend("fresh".to_string(), "fresher".to_string()).expect("no cycle");

        prop_assert_eq!(g.nodes(), snapshot_nodes);
        prop_assert_eq!(g.edge_count(), snapshot_edges);
        prop_assert!(!g.contains("fresh"));
        prop_assert!(later.contains("fresh"));
    }
}

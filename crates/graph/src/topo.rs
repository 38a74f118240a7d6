//! Topological ordering of dependency graphs.
//!
//! [`topo_sort`] orders every node of a graph so that dependencies come
//! before the nodes that depend on them. [`TopoComparator`] turns that order
//! into a comparison usable with any sort routine, including on lists that
//! mention nodes the graph has never seen.

use crate::{DependencyGraph, Node};
use indexmap::{Equivalent, IndexMap};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::hash::Hash;
use tracing::debug;

/// A topologically sorted sequence of nodes, dependencies first.
pub type TopologicalOrder<N> = Vec<N>;

/// Sort every node of `graph` so that dependencies precede dependents.
///
/// Nodes that nothing depends on are peeled off first; removing their
/// outgoing edges exposes the dependencies that are no longer depended upon,
/// which are peeled next. Each peeled node is prepended to the result, so the
/// most depended-upon nodes end up first. Ties follow first-mention order in
/// the graph, which makes the output deterministic for a given construction.
#[must_use]
pub fn topo_sort<N: Node>(graph: &DependencyGraph<N>) -> TopologicalOrder<N> {
    let nodes = graph.nodes();
    let mut remaining: IndexMap<&N, usize> = nodes
        .iter()
        .map(|node| (node, graph.dependent_count(node)))
        .collect();

    let mut ready: VecDeque<&N> = remaining
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&node, _)| node)
        .collect();
    let mut peeled = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.pop_front() {
        for dependency in graph.dependencies_of(node) {
            if let Some(count) = remaining.get_mut(&dependency) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(dependency);
                }
            }
        }
        peeled.push(node.clone());
    }

    peeled.reverse();
    debug!("Topologically sorted {} nodes", peeled.len());
    peeled
}

/// Compares nodes by their position in a precomputed topological order.
///
/// Nodes unknown to the graph rank after every known node and compare equal
/// to each other, so a stable sort keeps their original relative order.
#[derive(Debug, Clone)]
pub struct TopoComparator<N: Node> {
    ranks: IndexMap<N, usize>,
}

impl<N: Node> TopoComparator<N> {
    /// Sort `graph` once and remember every node's position.
    #[must_use]
    pub fn new(graph: &DependencyGraph<N>) -> Self {
        let ranks = topo_sort(graph)
            .into_iter()
            .enumerate()
            .map(|(index, node)| (node, index))
            .collect();
        Self { ranks }
    }

    /// Position of `node` in the order, or `usize::MAX` if it is unknown.
    #[must_use]
    pub fn rank<Q>(&self, node: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.ranks.get(node).copied().unwrap_or(usize::MAX)
    }

    /// Compare two nodes by rank.
    #[must_use]
    pub fn compare<Q>(&self, a: &Q, b: &Q) -> Ordering
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.rank(a).cmp(&self.rank(b))
    }

    /// Stable-sort `items` into topological order.
    pub fn sort(&self, items: &mut [N]) {
        items.sort_by(|a, b| self.compare(a, b));
    }

    /// The precomputed order.
    pub fn order(&self) -> impl Iterator<Item = &N> {
        self.ranks.keys()
    }
}

/// Build a comparison function that orders nodes topologically.
///
/// The returned closure owns its precomputed order, so it can be handed to
/// `sort_by` directly and outlive `graph`.
///
/// ```
/// use keel_graph::{graph, topo_comparator};
///
/// let g = graph().depend("app", "db")?;
/// let mut keys = vec!["app", "cache", "db"];
/// keys.sort_by(topo_comparator(&g));
/// assert_eq!(keys, ["db", "app", "cache"]);
/// # Ok::<(), keel_graph::Error>(())
/// ```
pub fn topo_comparator<N: Node>(
    graph: &DependencyGraph<N>,
) -> impl Fn(&N, &N) -> Ordering + use<N> {
    let comparator = TopoComparator::new(graph);
    move |a: &N, b: &N| comparator.compare(a, b)
}

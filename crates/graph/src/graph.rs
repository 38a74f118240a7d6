//! Persistent dependency graph.
//!
//! A [`DependencyGraph`] records "node depends on dependency" edges in two
//! insertion-ordered maps kept as exact inverses of each other. Both maps sit
//! behind an [`Arc`], so cloning a graph is cheap and every mutating method
//! copies on write and returns a new value; graphs handed out earlier never
//! change.

use crate::{Error, Node, Result};
use indexmap::{Equivalent, IndexMap, IndexSet};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

type Adjacency<N> = IndexMap<N, IndexSet<N>>;

/// Immutable directed graph of dependency relationships.
///
/// Cycles are rejected when edges are added, so the graph is always acyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph<N: Node> {
    /// `node -> things node depends on`
    dependencies: Arc<Adjacency<N>>,
    /// `node -> things that depend on node`
    dependents: Arc<Adjacency<N>>,
}

/// Create an empty dependency graph.
#[must_use]
pub fn graph<N: Node>() -> DependencyGraph<N> {
    DependencyGraph::new()
}

impl<N: Node> DependencyGraph<N> {
    /// Create an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dependencies: Arc::default(),
            dependents: Arc::default(),
        }
    }

    /// Returns a new graph where `node` depends on `dependency`.
    ///
    /// Adding an edge that already exists returns an equal graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularDependency`] if `node` and `dependency` are the
    /// same node or if `dependency` already depends on `node`, directly or
    /// transitively. The graph is left untouched.
    pub fn depend(&self, node: N, dependency: N) -> Result<Self> {
        if node == dependency || self.depends_on(&dependency, &node) {
            debug!(
                "Rejected edge '{}' -> '{}': would create a cycle",
                node, dependency
            );
            return Err(Error::circular(&node, &dependency));
        }

        let mut next = self.clone();
        Arc::make_mut(&mut next.dependents)
            .entry(dependency.clone())
            .or_default()
            .insert(node.clone());
        debug!("Added dependency edge '{}' -> '{}'", node, dependency);
        Arc::make_mut(&mut next.dependencies)
            .entry(node)
            .or_default()
            .insert(dependency);

        Ok(next)
    }

    /// Returns a new graph without the edge `node -> dependency`.
    ///
    /// Removing an edge that does not exist returns an equal graph.
    #[must_use]
    pub fn remove_edge<Q>(&self, node: &Q, dependency: &Q) -> Self
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        let present = self
            .dependencies
            .get(node)
            .is_some_and(|deps| deps.contains(dependency));
        if !present {
            return self.clone();
        }

        let mut next = self.clone();
        if let Some(deps) = Arc::make_mut(&mut next.dependencies).get_mut(node) {
            deps.shift_remove(dependency);
        }
        if let Some(dependents) = Arc::make_mut(&mut next.dependents).get_mut(dependency) {
            dependents.shift_remove(node);
        }
        next
    }

    /// Returns a new graph in which `node` no longer depends on anything.
    ///
    /// Edges where other nodes depend on `node` are kept.
    #[must_use]
    pub fn remove_node<Q>(&self, node: &Q) -> Self
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        let Some(deps) = self.dependencies.get(node) else {
            return self.clone();
        };

        let mut next = self.clone();
        let dependents = Arc::make_mut(&mut next.dependents);
        for dependency in deps {
            if let Some(set) = dependents.get_mut(dependency) {
                set.shift_remove(node);
            }
        }
        Arc::make_mut(&mut next.dependencies).shift_remove(node);
        next
    }

    /// Returns a new graph with every reference to `node` removed.
    #[must_use]
    pub fn remove_all<Q>(&self, node: &Q) -> Self
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        if !self.contains(node) {
            return self.clone();
        }

        let mut next = self.clone();
        for map in [&mut next.dependencies, &mut next.dependents] {
            let map = Arc::make_mut(map);
            map.shift_remove(node);
            for set in map.values_mut() {
                set.shift_remove(node);
            }
        }
        next
    }

    /// Returns the set of immediate dependencies of `node`.
    #[must_use]
    pub fn immediate_dependencies<Q>(&self, node: &Q) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.dependencies.get(node).cloned().unwrap_or_default()
    }

    /// Returns the set of immediate dependents of `node`.
    #[must_use]
    pub fn immediate_dependents<Q>(&self, node: &Q) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.dependents.get(node).cloned().unwrap_or_default()
    }

    /// Returns everything `node` depends on, directly or transitively.
    #[must_use]
    pub fn transitive_dependencies<Q>(&self, node: &Q) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        transitive(&self.dependencies, [node])
    }

    /// Returns everything that depends on `node`, directly or transitively.
    #[must_use]
    pub fn transitive_dependents<Q>(&self, node: &Q) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        transitive(&self.dependents, [node])
    }

    /// Returns everything any node in `nodes` depends on, directly or transitively.
    #[must_use]
    pub fn transitive_dependencies_set<'a, Q, I>(&self, nodes: I) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N> + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        transitive(&self.dependencies, nodes)
    }

    /// Returns everything that depends on any node in `nodes`, directly or transitively.
    #[must_use]
    pub fn transitive_dependents_set<'a, Q, I>(&self, nodes: I) -> IndexSet<N>
    where
        Q: ?Sized + Hash + Equivalent<N> + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        transitive(&self.dependents, nodes)
    }

    /// True if `node` depends on `dependency`, directly or transitively.
    #[must_use]
    pub fn depends_on<Q>(&self, node: &Q, dependency: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.transitive_dependencies(node).contains(dependency)
    }

    /// True if `dependent` depends on `node`, directly or transitively.
    #[must_use]
    pub fn is_dependency_of<Q>(&self, node: &Q, dependent: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.transitive_dependents(node).contains(dependent)
    }

    /// Returns every node mentioned in the graph, in first-mention order.
    #[must_use]
    pub fn nodes(&self) -> IndexSet<N> {
        let mut nodes = IndexSet::new();
        for (node, deps) in self.dependencies.iter() {
            nodes.insert(node.clone());
            nodes.extend(deps.iter().cloned());
        }
        nodes.extend(self.dependents.keys().cloned());
        nodes
    }

    /// Check if `node` is mentioned anywhere in the graph.
    #[must_use]
    pub fn contains<Q>(&self, node: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.dependencies.contains_key(node) || self.dependents.contains_key(node)
    }

    /// Iterate over all `(node, dependency)` edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&N, &N)> {
        self.dependencies
            .iter()
            .flat_map(|(node, deps)| deps.iter().map(move |dependency| (node, dependency)))
    }

    /// Get the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(IndexSet::len).sum()
    }

    /// Check if the graph mentions no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }

    /// Direct dependencies of `node` without cloning the set.
    pub(crate) fn dependencies_of<Q>(&self, node: &Q) -> impl Iterator<Item = &N>
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.dependencies.get(node).into_iter().flatten()
    }

    /// Number of direct dependents of `node`.
    pub(crate) fn dependent_count<Q>(&self, node: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<N>,
    {
        self.dependents.get(node).map_or(0, IndexSet::len)
    }

    /// Export the graph to petgraph.
    ///
    /// Edges point from dependency to dependent, so petgraph's own
    /// `toposort` yields dependencies first.
    #[must_use]
    pub fn to_digraph(&self) -> DiGraph<N, ()> {
        let mut digraph = DiGraph::new();
        let mut indices: IndexMap<N, NodeIndex> = IndexMap::new();

        for node in self.nodes() {
            let index = digraph.add_node(node.clone());
            indices.insert(node, index);
        }

        for (node, dependency) in self.edges() {
            if let (Some(&from), Some(&to)) = (indices.get(dependency), indices.get(node)) {
                digraph.add_edge(from, to, ());
            }
        }

        digraph
    }

    /// Render the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let labelled = self
            .to_digraph()
            .map(|_, node| node.to_string(), |_, _| String::new());
        format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
    }
}

impl<N: Node> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand the neighbours of `seeds` to arbitrary depth.
///
/// Each node is expanded at most once, so shared ancestors are visited a
/// single time no matter how many paths lead to them.
fn transitive<'a, N, Q, I>(neighbors: &Adjacency<N>, seeds: I) -> IndexSet<N>
where
    N: Node,
    Q: ?Sized + Hash + Equivalent<N> + 'a,
    I: IntoIterator<Item = &'a Q>,
{
    let mut expanded = IndexSet::new();
    let mut unexpanded: Vec<&N> = seeds
        .into_iter()
        .filter_map(|seed| neighbors.get(seed))
        .flatten()
        .collect();

    while let Some(node) = unexpanded.pop() {
        if expanded.contains(node) {
            continue;
        }
        expanded.insert(node.clone());
        if let Some(next) = neighbors.get(node) {
            unexpanded.extend(next.iter().filter(|n| !expanded.contains(*n)));
        }
    }

    expanded
}

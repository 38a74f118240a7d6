//! Persistent dependency graphs for keel.
//!
//! This crate provides an immutable directed acyclic graph of "depends on"
//! relationships, with transitive closure queries in both directions and a
//! deterministic topological order.
//!
//! # Key Types
//!
//! - [`DependencyGraph`]: The graph itself; every mutation returns a new value
//! - [`TopoComparator`]: A comparison over nodes derived from [`topo_sort`]
//! - [`Node`]: Trait bound for node identifiers, implemented for any suitable type
//!
//! # Example
//!
//! ```
//! use keel_graph::{graph, topo_sort};
//!
//! let g = graph()
//!     .depend("api", "db")?
//!     .depend("api", "cache")?
//!     .depend("cache", "db")?;
//!
//! assert!(g.depends_on("api", "db"));
//! assert_eq!(topo_sort(&g), ["db", "cache", "api"]);
//!
//! // Cycles are rejected.
//! assert!(g.depend("db", "api").is_err());
//! # Ok::<(), keel_graph::Error>(())
//! ```

mod error;
mod graph;
mod topo;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, graph};
pub use topo::{TopoComparator, TopologicalOrder, topo_comparator, topo_sort};

use std::fmt::Display;
use std::hash::Hash;

/// Trait for values that can identify a node in a [`DependencyGraph`].
///
/// Blanket-implemented for every `Clone + Eq + Hash + Display` type, so
/// strings, integers and most newtype keys work out of the box. `Display` is
/// used to name both endpoints when a cycle is rejected.
pub trait Node: Clone + Eq + Hash + Display {}

impl<T: Clone + Eq + Hash + Display> Node for T {}

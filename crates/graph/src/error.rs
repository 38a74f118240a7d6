//! Error types for dependency graph operations.

use thiserror::Error;

/// Result type for dependency graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The proposed edge would close a cycle, or points a node at itself.
    #[error("Circular dependency between {node} and {dependency}")]
    CircularDependency {
        /// The node that was asked to depend on `dependency`.
        node: String,
        /// The proposed dependency, which already depends on `node`.
        dependency: String,
    },
}

impl Error {
    /// Create a circular dependency error for the attempted edge `node -> dependency`.
    pub fn circular(node: impl ToString, dependency: impl ToString) -> Self {
        Self::CircularDependency {
            node: node.to_string(),
            dependency: dependency.to_string(),
        }
    }
}

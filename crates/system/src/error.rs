//! Error types for the keel-system crate

use crate::component::Component;
use crate::lifecycle::{BoxError, Method};
use crate::system::Registry;
use miette::Diagnostic;
use thiserror::Error;

/// Kind of failure, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    /// A key was never registered.
    MissingComponent,
    /// A key is registered but its value is null.
    NullComponent,
    /// A component's own `start` or `stop` failed.
    ComponentMethod,
    /// Dependency declarations form a cycle.
    CircularDependency,
    /// Starting or stopping a top-level component failed.
    Lifecycle,
}

impl ErrorReason {
    /// Kebab-case name of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingComponent => "missing-component",
            Self::NullComponent => "null-component",
            Self::ComponentMethod => "component-method-error",
            Self::CircularDependency => "circular-dependency",
            Self::Lifecycle => "lifecycle-error",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn missing_message(key: &str, dependency: Option<&str>) -> String {
    match dependency {
        Some(dependency) => {
            format!("Component {key} depends on {dependency}, which is missing from the system")
        }
        None => format!("Component {key} is missing from the system"),
    }
}

fn null_message(key: &str, dependency: Option<&str>) -> String {
    match dependency {
        Some(dependency) => format!(
            "Component {key} depends on {dependency}, which is null in the system; \
             maybe it returned nothing from start or stop"
        ),
        None => format!(
            "Component {key} is null in the system; maybe it returned nothing from start or stop"
        ),
    }
}

/// Main error type for keel-system operations
///
/// Orchestration errors carry `system`, the registry as it stood when the
/// pass aborted, so the caller can stop whatever already started.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A component or one of its dependencies was never registered
    #[error("{}", missing_message(.key, .dependency.as_deref()))]
    #[diagnostic(
        code(keel::system::missing_component),
        help("register a component under this key or remove it from the declaration")
    )]
    MissingComponent {
        /// The system key being processed
        key: String,
        /// The declared dependency key that could not be found, if any
        dependency: Option<String>,
        /// The component being processed, if it was found
        component: Option<Component>,
        /// The registry when the pass aborted
        system: Registry,
    },

    /// A component or one of its dependencies is registered but null
    #[error("{}", null_message(.key, .dependency.as_deref()))]
    #[diagnostic(code(keel::system::null_component))]
    NullComponent {
        /// The system key being processed
        key: String,
        /// The declared dependency key whose value is null, if any
        dependency: Option<String>,
        /// The registry when the pass aborted
        system: Registry,
    },

    /// A component's `start` or `stop` returned an error
    #[error("Error in component {key} ({}) calling {method}: {source}", .component.name())]
    #[diagnostic(code(keel::system::component_method))]
    ComponentMethod {
        /// The system key being processed
        key: String,
        /// The operation that failed
        method: Method,
        /// The failing component, as it was before the call
        component: Component,
        /// The error the component returned
        #[source]
        source: BoxError,
        /// The registry when the pass aborted
        system: Registry,
    },

    /// Dependency declarations form a cycle
    #[error(transparent)]
    #[diagnostic(code(keel::system::circular_dependency))]
    Graph(#[from] keel_graph::Error),

    /// Starting or stopping a top-level component failed
    #[error("Failed to {method} {component}: {source}")]
    #[diagnostic(code(keel::system::lifecycle))]
    Lifecycle {
        /// The operation that failed
        method: Method,
        /// Name of the component
        component: String,
        /// The underlying failure
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Create a missing-component error for the component at `key` itself
    pub fn missing_component(key: impl Into<String>, system: Registry) -> Self {
        Self::MissingComponent {
            key: key.into(),
            dependency: None,
            component: None,
            system,
        }
    }

    /// Create a missing-component error for a dependency of the component at `key`
    pub fn missing_dependency(
        key: impl Into<String>,
        dependency: impl Into<String>,
        component: Component,
        system: Registry,
    ) -> Self {
        Self::MissingComponent {
            key: key.into(),
            dependency: Some(dependency.into()),
            component: Some(component),
            system,
        }
    }

    /// Create a null-component error, optionally attributed to a dependency
    pub fn null_component(
        key: impl Into<String>,
        dependency: Option<String>,
        system: Registry,
    ) -> Self {
        Self::NullComponent {
            key: key.into(),
            dependency,
            system,
        }
    }

    /// Create a component-method error
    pub fn component_method(
        key: impl Into<String>,
        method: Method,
        component: Component,
        source: BoxError,
        system: Registry,
    ) -> Self {
        Self::ComponentMethod {
            key: key.into(),
            method,
            component,
            source,
            system,
        }
    }

    /// Create a top-level lifecycle error
    pub fn lifecycle(method: Method, component: impl Into<String>, source: BoxError) -> Self {
        Self::Lifecycle {
            method,
            component: component.into(),
            source,
        }
    }

    /// The kind of failure.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::MissingComponent { .. } => ErrorReason::MissingComponent,
            Self::NullComponent { .. } => ErrorReason::NullComponent,
            Self::ComponentMethod { .. } => ErrorReason::ComponentMethod,
            Self::Graph(_) => ErrorReason::CircularDependency,
            Self::Lifecycle { .. } => ErrorReason::Lifecycle,
        }
    }

    /// The system key being processed when the pass aborted.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingComponent { key, .. }
            | Self::NullComponent { key, .. }
            | Self::ComponentMethod { key, .. } => Some(key),
            Self::Graph(_) | Self::Lifecycle { .. } => None,
        }
    }

    /// The dependency key a resolution failure is attributed to.
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::MissingComponent { dependency, .. } | Self::NullComponent { dependency, .. } => {
                dependency.as_deref()
            }
            _ => None,
        }
    }

    /// The component being processed when the pass aborted, if it was found.
    #[must_use]
    pub const fn component(&self) -> Option<&Component> {
        match self {
            Self::MissingComponent { component, .. } => component.as_ref(),
            Self::ComponentMethod { component, .. } => Some(component),
            _ => None,
        }
    }

    /// The registry when the pass aborted.
    #[must_use]
    pub const fn system(&self) -> Option<&Registry> {
        match self {
            Self::MissingComponent { system, .. }
            | Self::NullComponent { system, .. }
            | Self::ComponentMethod { system, .. } => Some(system),
            Self::Graph(_) | Self::Lifecycle { .. } => None,
        }
    }
}

/// Result type for keel-system operations
pub type Result<T> = std::result::Result<T, Error>;

//! Components: a lifecycle value plus the dependencies it declares.

use crate::lifecycle::{Instance, Lifecycle, downcast_instance};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared dependencies of a component, mapping the name a dependency is
/// injected under to the system key that produces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    entries: IndexMap<String, String>,
}

impl DependencyMap {
    /// Create an empty declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that the value at system key `key` is injected as `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.entries.insert(name.into(), key.into());
        self
    }

    /// The system key injected under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Iterate over `(name, key)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, key)| (name.as_str(), key.as_str()))
    }

    /// The names dependencies are injected under.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The system keys this component depends on.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Number of declared dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DependencyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, key)| (name.into(), key.into()))
                .collect(),
        }
    }
}

fn identity<S: AsRef<str>>(keys: impl IntoIterator<Item = S>) -> DependencyMap {
    keys.into_iter()
        .map(|key| (key.as_ref().to_string(), key.as_ref().to_string()))
        .collect()
}

impl<const N: usize> From<[&str; N]> for DependencyMap {
    fn from(keys: [&str; N]) -> Self {
        identity(keys)
    }
}

impl From<&[&str]> for DependencyMap {
    fn from(keys: &[&str]) -> Self {
        identity(keys)
    }
}

impl From<Vec<&str>> for DependencyMap {
    fn from(keys: Vec<&str>) -> Self {
        identity(keys)
    }
}

impl From<Vec<String>> for DependencyMap {
    fn from(keys: Vec<String>) -> Self {
        identity(keys)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for DependencyMap {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Vec<(String, String)>> for DependencyMap {
    fn from(pairs: Vec<(String, String)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<IndexMap<String, String>> for DependencyMap {
    fn from(entries: IndexMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<S: std::hash::BuildHasher> From<HashMap<String, String, S>> for DependencyMap {
    fn from(entries: HashMap<String, String, S>) -> Self {
        entries.into_iter().collect()
    }
}

/// An immutable pairing of a lifecycle value with its declared dependencies.
///
/// Cloning is cheap: the lifecycle value is shared.
#[derive(Clone)]
pub struct Component {
    instance: Instance,
    dependencies: DependencyMap,
}

impl Component {
    /// Wrap a lifecycle with no dependencies.
    pub fn new(lifecycle: impl Lifecycle) -> Self {
        Self::from_instance(Arc::new(lifecycle))
    }

    /// Wrap an already shared lifecycle value with no dependencies.
    #[must_use]
    pub fn from_instance(instance: Instance) -> Self {
        Self {
            instance,
            dependencies: DependencyMap::new(),
        }
    }

    /// Returns a new component with `dependencies` as its declaration.
    ///
    /// Accepts a list of keys, injected under their own names, or explicit
    /// `(name, key)` pairs:
    ///
    /// ```
    /// use keel_system::{Constant, component};
    ///
    /// let api = component(Constant::new("api")).using(["db", "cache"]);
    /// assert_eq!(api.dependencies().get("db"), Some("db"));
    ///
    /// let api = component(Constant::new("api")).using([("db", "postgres")]);
    /// assert_eq!(api.dependencies().get("db"), Some("postgres"));
    /// ```
    #[must_use]
    pub fn using(self, dependencies: impl Into<DependencyMap>) -> Self {
        Self {
            instance: self.instance,
            dependencies: dependencies.into(),
        }
    }

    /// The declared dependencies.
    #[must_use]
    pub const fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// The current lifecycle value.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The lifecycle's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.instance.name()
    }

    /// Borrow the lifecycle value as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        downcast_instance::<T>(&self.instance)
    }

    /// Same declaration, new lifecycle value.
    #[must_use]
    pub fn with_instance(&self, instance: Instance) -> Self {
        Self {
            instance,
            dependencies: self.dependencies.clone(),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("lifecycle", &self.name())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Wrap a lifecycle with no dependencies.
pub fn component(lifecycle: impl Lifecycle) -> Component {
    Component::new(lifecycle)
}

/// Returns `component` with `dependencies` as its declaration.
#[must_use]
pub fn using(component: Component, dependencies: impl Into<DependencyMap>) -> Component {
    component.using(dependencies)
}

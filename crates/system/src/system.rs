//! System maps: named components started and stopped in dependency order.
//!
//! A [`SystemMap`] owns a [`Registry`] of components keyed by name. Each
//! orchestration pass builds a fresh dependency graph from the components'
//! declarations, sorts the keys topologically (reversed for `stop`) and then
//! calls each component in turn, strictly one at a time, injecting the
//! current values of the keys it depends on. Every call's result is written
//! to a new registry snapshot before the next key is processed.

use crate::component::Component;
use crate::error::{Error, Result};
use crate::lifecycle::{Dependencies, Instance, Lifecycle, LifecycleResult, Method};
use async_trait::async_trait;
use indexmap::IndexMap;
use keel_graph::{DependencyGraph, TopoComparator};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The state of one key in a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub enum Slot<'a> {
    /// The key was never registered.
    Missing,
    /// The key is registered, but its last lifecycle call returned nothing.
    Null,
    /// The key holds a component.
    Present(&'a Component),
}

/// Immutable snapshot of a system's components.
///
/// Inserting returns a new snapshot and leaves shared copies untouched.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<IndexMap<String, Option<Component>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, distinguishing unregistered from null.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Slot<'_> {
        match self.entries.get(key) {
            None => Slot::Missing,
            Some(None) => Slot::Null,
            Some(Some(component)) => Slot::Present(component),
        }
    }

    /// The component at `key`, if it is registered and not null.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Component> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    /// Check if `key` is registered, null or not.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over every key and its component, `None` for null entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Component>)> {
        self.entries
            .iter()
            .map(|(key, component)| (key.as_str(), component.as_ref()))
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a registry with `key` set to `value`.
    ///
    /// An existing key keeps its position.
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, value: Option<Component>) -> Self {
        Arc::make_mut(&mut self.entries).insert(key.into(), value);
        self
    }
}

impl<K: Into<String>> FromIterator<(K, Component)> for Registry {
    fn from_iter<I: IntoIterator<Item = (K, Component)>>(iter: I) -> Self {
        Self {
            entries: Arc::new(
                iter.into_iter()
                    .map(|(key, component)| (key.into(), Some(component)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(key, component)| (key, component.as_ref().map(Component::name))),
            )
            .finish()
    }
}

/// A set of named components orchestrated as one.
///
/// A `SystemMap` is itself a [`Lifecycle`], so it can be wrapped with
/// [`system_map`] and nested inside an enclosing system. Dependencies the
/// enclosing system injects are visible to the nested components' dependency
/// lookups but are never started or stopped by the nested system.
#[derive(Debug, Clone, Default)]
pub struct SystemMap {
    registry: Registry,
    injected: Dependencies,
}

impl SystemMap {
    /// Create a system from `(key, component)` pairs.
    pub fn new<K: Into<String>>(components: impl IntoIterator<Item = (K, Component)>) -> Self {
        Self::from_registry(components.into_iter().collect())
    }

    /// Create a system over an existing registry snapshot.
    ///
    /// Useful for stopping the components a failed pass managed to start,
    /// using the registry carried by the error.
    #[must_use]
    pub fn from_registry(registry: Registry) -> Self {
        Self {
            registry,
            injected: Dependencies::new(),
        }
    }

    /// The component at `key`, if registered and not null.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Component> {
        self.registry.get(key)
    }

    /// The current lifecycle value at `key`.
    #[must_use]
    pub fn instance(&self, key: &str) -> Option<&Instance> {
        self.get(key).map(Component::instance)
    }

    /// Borrow the lifecycle value at `key` as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(Component::downcast_ref::<T>)
    }

    /// Check if `key` is registered.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.registry.keys()
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if the system has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// The current registry snapshot.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Graph of the declared dependencies: each key depends on the keys it
    /// declares. Null entries declare nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] if the declarations form a cycle.
    pub fn dependency_graph(&self) -> Result<DependencyGraph<String>> {
        let mut graph = DependencyGraph::new();
        for (key, component) in self.registry.iter() {
            let Some(component) = component else {
                continue;
            };
            for dependency in component.dependencies().keys() {
                graph = graph.depend(key.to_string(), dependency.to_string())?;
            }
        }
        Ok(graph)
    }

    /// The order in which `method` visits the registered keys.
    ///
    /// Keys are stable-sorted topologically from registration order; keys
    /// without any edges come after the rest. `stop` visits the reverse of
    /// `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] if the declarations form a cycle.
    pub fn order(&self, method: Method) -> Result<Vec<String>> {
        let comparator = TopoComparator::new(&self.dependency_graph()?);
        let mut keys: Vec<String> = self.registry.keys().map(str::to_string).collect();
        keys.sort_by(|a, b| comparator.compare(a.as_str(), b.as_str()));
        if method == Method::Stop {
            keys.reverse();
        }
        debug!(?keys, "Computed {method} order");
        Ok(keys)
    }

    /// Start every component, dependencies first.
    ///
    /// # Errors
    ///
    /// Aborts at the first failing key and returns the structured [`Error`];
    /// components before it have already been started.
    #[instrument(skip_all, fields(components = self.len()))]
    pub async fn start(&self) -> Result<Self> {
        self.update(Method::Start).await
    }

    /// Stop every component, dependents first.
    ///
    /// # Errors
    ///
    /// Aborts at the first failing key and returns the structured [`Error`];
    /// components before it have already been stopped.
    #[instrument(skip_all, fields(components = self.len()))]
    pub async fn stop(&self) -> Result<Self> {
        self.update(Method::Stop).await
    }

    fn with_injected(&self, injected: Dependencies) -> Self {
        Self {
            registry: self.registry.clone(),
            injected,
        }
    }

    async fn update(&self, method: Method) -> Result<Self> {
        let mut registry = self.registry.clone();

        for key in self.order(method)? {
            // `order` yields only registered keys and passes never unregister
            // one, so `Missing` cannot occur for the key itself.
            let component = match registry.lookup(&key) {
                Slot::Present(component) => component.clone(),
                Slot::Null => return Err(Error::null_component(key, None, registry)),
                Slot::Missing => return Err(Error::missing_component(key, registry)),
            };
            let deps = self.resolve(&registry, &key, &component)?;

            let value = method
                .invoke(Arc::clone(component.instance()), deps)
                .await
                .map_err(|source| {
                    Error::component_method(
                        key.as_str(),
                        method,
                        component.clone(),
                        source,
                        registry.clone(),
                    )
                })?
                .map(|instance| component.with_instance(instance));

            match &value {
                Some(next) => info!(key = %key, component = next.name(), "Component {method} complete"),
                None => warn!(key = %key, "Component returned nothing from {method}"),
            }
            registry = registry.insert(key, value);
        }

        Ok(Self {
            registry,
            injected: self.injected.clone(),
        })
    }

    /// Resolve the declared dependencies of the component at `key` against
    /// `registry`, then against injected dependencies.
    fn resolve(&self, registry: &Registry, key: &str, component: &Component) -> Result<Dependencies> {
        let mut deps = Dependencies::new();
        for (name, dependency) in component.dependencies().iter() {
            let instance = match registry.lookup(dependency) {
                Slot::Present(producer) => Arc::clone(producer.instance()),
                Slot::Null => {
                    return Err(Error::null_component(
                        key,
                        Some(dependency.to_string()),
                        registry.clone(),
                    ));
                }
                Slot::Missing => match self.injected.instance(dependency) {
                    Some(instance) => Arc::clone(instance),
                    None => {
                        return Err(Error::missing_dependency(
                            key,
                            dependency,
                            component.clone(),
                            registry.clone(),
                        ));
                    }
                },
            };
            deps.insert(name, instance);
        }
        Ok(deps)
    }
}

#[async_trait]
impl Lifecycle for SystemMap {
    async fn start(self: Arc<Self>, deps: Dependencies) -> LifecycleResult {
        let started: Instance = Arc::new(self.with_injected(deps).update(Method::Start).await?);
        Ok(Some(started))
    }

    async fn stop(self: Arc<Self>, deps: Dependencies) -> LifecycleResult {
        let stopped: Instance = Arc::new(self.with_injected(deps).update(Method::Stop).await?);
        Ok(Some(stopped))
    }

    fn name(&self) -> &str {
        "SystemMap"
    }
}

/// Wrap `components` in a component whose lifecycle orchestrates them.
pub fn system_map<K: Into<String>>(components: impl IntoIterator<Item = (K, Component)>) -> Component {
    Component::new(SystemMap::new(components))
}

/// Start a component on its own, with no dependencies.
///
/// # Errors
///
/// A structured [`Error`] from a nested system is returned as is. Any other
/// failure, or a lifecycle returning nothing, becomes [`Error::Lifecycle`].
pub async fn start(component: &Component) -> Result<Component> {
    invoke(component, Method::Start).await
}

/// Stop a component on its own, with no dependencies.
///
/// # Errors
///
/// See [`start`].
pub async fn stop(component: &Component) -> Result<Component> {
    invoke(component, Method::Stop).await
}

async fn invoke(component: &Component, method: Method) -> Result<Component> {
    match method
        .invoke(Arc::clone(component.instance()), Dependencies::new())
        .await
    {
        Ok(Some(instance)) => Ok(component.with_instance(instance)),
        Ok(None) => Err(Error::lifecycle(
            method,
            component.name(),
            "lifecycle returned nothing".into(),
        )),
        Err(source) => match source.downcast::<Error>() {
            Ok(err) => Err(*err),
            Err(source) => Err(Error::lifecycle(method, component.name(), source)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::component;
    use crate::lifecycle::Constant;

    fn constant(value: &'static str) -> Component {
        component(Constant::new(value))
    }

    #[test]
    fn test_registry_distinguishes_missing_and_null() {
        let registry: Registry = [("a", constant("a"))].into_iter().collect();
        let registry = registry.insert("b", None);

        assert!(matches!(registry.lookup("a"), Slot::Present(_)));
        assert!(matches!(registry.lookup("b"), Slot::Null));
        assert!(matches!(registry.lookup("c"), Slot::Missing));
        assert!(registry.contains_key("b"));
        assert!(registry.get("b").is_none());
        assert_eq!(format!("{registry:?}").matches("None").count(), 1);
    }

    #[test]
    fn test_registry_snapshots_are_persistent() {
        let first: Registry = [("a", constant("a"))].into_iter().collect();
        let second = first.clone().insert("a", None).insert("b", Some(constant("b")));

        assert!(first.get("a").is_some());
        assert_eq!(first.len(), 1);
        assert_eq!(second.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(second.get("a").is_none());
    }

    #[test]
    fn test_order_sorts_dependencies_first() {
        let system = SystemMap::new([
            ("api", constant("api").using(["db", "cache"])),
            ("metrics", constant("metrics")),
            ("cache", constant("cache").using(["db"])),
            ("db", constant("db")),
        ]);

        assert_eq!(
            system.order(Method::Start).unwrap(),
            vec!["db", "cache", "api", "metrics"]
        );
        assert_eq!(
            system.order(Method::Stop).unwrap(),
            vec!["metrics", "api", "cache", "db"]
        );
    }

    #[test]
    fn test_order_only_visits_registered_keys() {
        let system = SystemMap::new([
            ("api", constant("api").using(["db", "unregistered"])),
            ("db", constant("db")),
        ]);
        let graph = system.dependency_graph().unwrap();
        assert!(graph.contains("unregistered"));

        for method in [Method::Start, Method::Stop] {
            let order = system.order(method).unwrap();
            assert_eq!(order.len(), system.len());
            assert!(order.iter().all(|key| system.contains_key(key)));
        }

        let err = tokio_test::block_on(system.start()).unwrap_err();
        assert_eq!(err.key(), Some("api"));
        assert_eq!(err.dependency(), Some("unregistered"));
        assert_eq!(err.component().map(Component::name), Some(system.get("api").unwrap().name()));
    }

    #[test]
    fn test_order_rejects_cycles() {
        let system = SystemMap::new([
            ("a", constant("a").using(["b"])),
            ("b", constant("b").using(["a"])),
        ]);
        let err = system.order(Method::Start).unwrap_err();
        assert_eq!(err.reason().as_str(), "circular-dependency");
        assert_eq!(err.to_string(), "Circular dependency between b and a");
    }

    #[test]
    fn test_dependency_graph_uses_producer_keys() {
        let system = SystemMap::new([
            ("api", constant("api").using([("db", "postgres")])),
            ("postgres", constant("pg")),
        ]);
        let graph = system.dependency_graph().unwrap();
        assert!(graph.depends_on("api", "postgres"));
        assert!(!graph.contains("db"));
    }

    #[test]
    fn test_start_injects_by_name() {
        let system = SystemMap::new([
            ("api", constant("api").using([("db", "postgres")])),
            ("postgres", constant("pg")),
        ]);
        let registry = system.registry().clone();
        let api = system.get("api").unwrap();
        let deps = system.resolve(&registry, "api", api).unwrap();
        assert_eq!(deps.names().collect::<Vec<_>>(), vec!["db"]);
        assert_eq!(deps.constant::<&str>("db"), Some(&"pg"));
    }

    #[test]
    fn test_constant_system_round_trips() {
        let system = SystemMap::new([("a", constant("a")), ("b", constant("b").using(["a"]))]);
        let started = tokio_test::block_on(system.start()).unwrap();
        let stopped = tokio_test::block_on(started.stop()).unwrap();

        assert_eq!(stopped.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            stopped
                .downcast_ref::<Constant<&str>>("b")
                .map(Constant::get),
            Some(&"b")
        );
        assert_eq!(stopped.get("b").unwrap().dependencies().get("a"), Some("a"));
    }

    #[test]
    fn test_root_start_unwraps_system_errors() {
        let root = system_map([("a", constant("a").using(["missing"]))]);
        let err = tokio_test::block_on(start(&root)).unwrap_err();
        assert_eq!(err.reason().as_str(), "missing-component");
        assert_eq!(err.key(), Some("a"));
        assert_eq!(err.dependency(), Some("missing"));
    }
}

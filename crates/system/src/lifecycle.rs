//! The lifecycle contract every component implements.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by lifecycle operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The current value of a component: whatever its last `start`/`stop` returned.
pub type Instance = Arc<dyn Lifecycle>;

/// Result of a lifecycle operation.
///
/// `Ok(None)` means the operation returned nothing; the component's slot in
/// the system becomes null.
pub type LifecycleResult = Result<Option<Instance>, BoxError>;

/// Type-erased access to a lifecycle value.
///
/// Blanket-implemented for every `Any + Send + Sync` type so implementors of
/// [`Lifecycle`] never write it by hand.
pub trait AsAny: Any + Send + Sync {
    /// Returns self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts an `Arc` of self into an `Arc` of `Any` for owned downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A component's two lifecycle operations.
///
/// Both take the resolved values of the component's declared dependencies and
/// return the component's new value, which replaces it in the system. Returning
/// `self` is the usual way to say "nothing changed".
///
/// # Example
///
/// ```
/// use keel_system::{Dependencies, Instance, Lifecycle, LifecycleResult};
/// use std::sync::Arc;
///
/// struct Server {
///     port: u16,
///     running: bool,
/// }
///
/// #[async_trait::async_trait]
/// impl Lifecycle for Server {
///     async fn start(self: Arc<Self>, _deps: Dependencies) -> LifecycleResult {
///         let started: Instance = Arc::new(Server { port: self.port, running: true });
///         Ok(Some(started))
///     }
///
///     async fn stop(self: Arc<Self>, _deps: Dependencies) -> LifecycleResult {
///         let stopped: Instance = Arc::new(Server { port: self.port, running: false });
///         Ok(Some(stopped))
///     }
/// }
/// ```
#[async_trait]
pub trait Lifecycle: AsAny {
    /// Start the component.
    async fn start(self: Arc<Self>, deps: Dependencies) -> LifecycleResult;

    /// Stop the component.
    async fn stop(self: Arc<Self>, deps: Dependencies) -> LifecycleResult;

    /// Name used in logs and errors. Defaults to the concrete type name.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// One of the two lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// [`Lifecycle::start`]
    Start,
    /// [`Lifecycle::stop`]
    Stop,
}

impl Method {
    /// Lowercase name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    /// Call this operation on `instance`.
    pub async fn invoke(self, instance: Instance, deps: Dependencies) -> LifecycleResult {
        match self {
            Self::Start => instance.start(deps).await,
            Self::Stop => instance.stop(deps).await,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle for plain values such as configuration or shared handles.
///
/// Starting and stopping a constant returns it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constant<T>(pub T);

impl<T> Constant<T> {
    /// Wrap a value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the wrapped value.
    pub const fn get(&self) -> &T {
        &self.0
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Lifecycle for Constant<T> {
    async fn start(self: Arc<Self>, _deps: Dependencies) -> LifecycleResult {
        let instance: Instance = self;
        Ok(Some(instance))
    }

    async fn stop(self: Arc<Self>, _deps: Dependencies) -> LifecycleResult {
        let instance: Instance = self;
        Ok(Some(instance))
    }
}

/// Errors raised by the typed accessors on [`Dependencies`].
#[derive(Debug, Error)]
pub enum DependencyError {
    /// No dependency was injected under this name.
    #[error("Dependency '{name}' was not injected")]
    Missing {
        /// The dependency name that was requested
        name: String,
    },

    /// The injected value has a different type than requested.
    #[error("Dependency '{name}' is a {actual}, not a {expected}")]
    WrongType {
        /// The dependency name that was requested
        name: String,
        /// The type that was requested
        expected: &'static str,
        /// The name of the injected component
        actual: String,
    },
}

/// Downcast an instance to its concrete type.
pub(crate) fn downcast_instance<T: Any>(instance: &Instance) -> Option<&T> {
    let lifecycle: &dyn Lifecycle = instance.as_ref();
    lifecycle.as_any().downcast_ref::<T>()
}

/// Resolved dependency values handed to [`Lifecycle::start`] and [`Lifecycle::stop`].
///
/// Keys are the names the component declared, not the system keys of the
/// producing components.
#[derive(Clone, Default)]
pub struct Dependencies {
    values: IndexMap<String, Instance>,
}

impl Dependencies {
    /// Create an empty set of dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency value under `name`.
    pub fn insert(&mut self, name: impl Into<String>, instance: Instance) {
        self.values.insert(name.into(), instance);
    }

    /// The raw instance injected under `name`.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.values.get(name)
    }

    /// Borrow the dependency `name` as a `T`.
    ///
    /// Returns `None` if nothing was injected under `name` or it is not a `T`.
    #[must_use]
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(downcast_instance::<T>)
    }

    /// Borrow the value inside a [`Constant`] dependency.
    #[must_use]
    pub fn constant<T: Any>(&self, name: &str) -> Option<&T> {
        self.get::<Constant<T>>(name).map(Constant::get)
    }

    /// Get a shared handle to the dependency `name` as a `T`.
    #[must_use]
    pub fn get_arc<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let instance = Arc::clone(self.values.get(name)?);
        instance.into_any().downcast::<T>().ok()
    }

    /// Borrow the dependency `name` as a `T`, or explain why it is unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] if the dependency is missing or has another type.
    pub fn require<T: Any>(&self, name: &str) -> Result<&T, DependencyError> {
        let instance = self
            .values
            .get(name)
            .ok_or_else(|| DependencyError::Missing {
                name: name.to_string(),
            })?;
        downcast_instance::<T>(instance).ok_or_else(|| DependencyError::WrongType {
            name: name.to_string(),
            expected: type_name::<T>(),
            actual: instance.name().to_string(),
        })
    }

    /// Names of all injected dependencies, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(name, instance)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.values.iter().map(|(name, instance)| (name.as_str(), instance))
    }

    /// Check if a dependency was injected under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of injected dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no dependencies were injected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Instance)> for Dependencies {
    fn from_iter<I: IntoIterator<Item = (K, Instance)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, instance)| (name.into(), instance))
                .collect(),
        }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(name, instance)| (name, instance.name())))
            .finish()
    }
}

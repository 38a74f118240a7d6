//! Component lifecycle orchestration for keel.
//!
//! Components are values with an asynchronous `start` and `stop`, plus a
//! declaration of the other components they depend on. A [`SystemMap`]
//! gathers components under string keys, derives a dependency graph from
//! their declarations and starts them dependencies first (stopping them in
//! reverse), injecting each component's dependencies by name.
//!
//! # Key Types
//!
//! - [`Lifecycle`]: The start/stop contract implemented by every component
//! - [`Component`]: A lifecycle value plus its declared dependencies
//! - [`SystemMap`]: Orchestrates a set of components; itself a lifecycle
//!
//! # Example
//!
//! ```
//! use keel_system::{Constant, Dependencies, Instance, Lifecycle, LifecycleResult, SystemMap, component};
//! use std::sync::Arc;
//!
//! struct Api {
//!     url: Option<String>,
//! }
//!
//! #[async_trait::async_trait]
//! impl Lifecycle for Api {
//!     async fn start(self: Arc<Self>, deps: Dependencies) -> LifecycleResult {
//!         let url = deps.require::<Constant<String>>("db")?.get().clone();
//!         let started: Instance = Arc::new(Api { url: Some(url) });
//!         Ok(Some(started))
//!     }
//!
//!     async fn stop(self: Arc<Self>, _deps: Dependencies) -> LifecycleResult {
//!         let stopped: Instance = Arc::new(Api { url: None });
//!         Ok(Some(stopped))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let system = SystemMap::new([
//!     ("api", component(Api { url: None }).using(["db"])),
//!     ("db", component(Constant::new("postgres://localhost".to_string()))),
//! ]);
//!
//! let started = system.start().await?;
//! let api = started.downcast_ref::<Api>("api").unwrap();
//! assert_eq!(api.url.as_deref(), Some("postgres://localhost"));
//!
//! let stopped = started.stop().await?;
//! assert!(stopped.downcast_ref::<Api>("api").unwrap().url.is_none());
//! # Ok::<(), keel_system::Error>(())
//! # }).unwrap();
//! ```

mod component;
mod error;
mod lifecycle;
mod system;

pub use component::{Component, DependencyMap, component, using};
pub use error::{Error, ErrorReason, Result};
pub use lifecycle::{
    AsAny, BoxError, Constant, Dependencies, DependencyError, Instance, Lifecycle,
    LifecycleResult, Method,
};
pub use system::{Registry, Slot, SystemMap, start, stop, system_map};

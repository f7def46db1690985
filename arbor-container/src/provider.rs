//! Lazy providers.
//!
//! A [`Provider<T>`] produces `T` on demand. Registered through
//! `Container::add_provider`, it satisfies requests for `T` (each request
//! calls the provider) and requests for `Provider<T>` itself (the caller gets
//! the provider and decides when to call it).
//!
//! # Examples
//! ```
//! use arbor_container::prelude::*;
//!
//! struct Connection { id: u32 }
//!
//! let container = Container::new();
//! container.add_provider(Provider::new(|| Ok(Connection { id: 7 }))).unwrap();
//!
//! let connection = container.component::<Connection>().unwrap();
//! assert_eq!(connection.id, 7);
//!
//! let provider = container.component::<Provider<Connection>>().unwrap();
//! assert_eq!(provider.get().unwrap().id, 7);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::{ArborError, Result};
use crate::implementation::{BoxError, Component, Implementation, Instance};
use crate::key::{ComponentKey, TypeInfo};
use crate::lifecycle::LifecycleStrategy;

type Provide<T> = dyn Fn() -> std::result::Result<T, BoxError> + Send + Sync;

/// Produces `T` on demand.
pub struct Provider<T> {
    provide: Arc<Provide<T>>,
    implementation: Implementation,
}

impl<T: Send + Sync + 'static> Provider<T> {
    pub fn new<F>(provide: F) -> Self
    where
        F: Fn() -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            provide: Arc::new(provide),
            implementation: Implementation::of::<T>(),
        }
    }

    /// Declares that provided values can be viewed as `I`.
    pub fn implements<I: ?Sized + 'static>(mut self, upcast: fn(Arc<T>) -> Arc<I>) -> Self {
        self.implementation = self.implementation.implements::<T, I>(upcast);
        self
    }

    pub fn get(&self) -> std::result::Result<Arc<T>, BoxError> {
        (self.provide)().map(Arc::new)
    }
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            provide: Arc::clone(&self.provide),
            implementation: self.implementation.clone(),
        }
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider<{}>", std::any::type_name::<T>())
    }
}

type ProvideAny = dyn Fn() -> std::result::Result<Instance, BoxError> + Send + Sync;

/// Adapter for a registered [`Provider`].
///
/// Its implementation is the *provided* type; the provider itself is also
/// reachable via [`ProviderAdapter::provider`].
pub struct ProviderAdapter {
    key: ComponentKey,
    provided: Implementation,
    provider: Component,
    provide: Arc<ProvideAny>,
    lifecycle: Arc<dyn LifecycleStrategy>,
}

impl ProviderAdapter {
    /// Keyed by the provided type.
    pub fn new<T: Send + Sync + 'static>(
        provider: Provider<T>,
        lifecycle: Arc<dyn LifecycleStrategy>,
    ) -> Self {
        let provided = provider.implementation.clone();
        let call = provider.clone();
        let provide: Arc<ProvideAny> = Arc::new(move || {
            let value: Instance = call.get()?;
            Ok(value)
        });

        Self {
            key: ComponentKey::of::<T>(),
            provided,
            provider: Component::of(provider),
            provide,
            lifecycle,
        }
    }

    pub fn with_key(mut self, key: impl Into<ComponentKey>) -> Self {
        self.key = key.into();
        self
    }

    /// The provider itself, as a component.
    pub fn provider(&self) -> &Component {
        &self.provider
    }

    pub fn provider_type(&self) -> TypeInfo {
        self.provider.implementation.info()
    }

    pub fn provided_type(&self) -> TypeInfo {
        self.provided.info()
    }
}

impl ComponentAdapter for ProviderAdapter {
    fn key(&self) -> &ComponentKey {
        &self.key
    }

    fn implementation(&self) -> &Implementation {
        &self.provided
    }

    fn produce(&self, _ctx: &ResolutionContext<'_>) -> Result<Instance> {
        (self.provide)().map_err(|err| ArborError::from_factory(&self.key, err))
    }

    fn descriptor(&self) -> String {
        format!("Provider<{}>", self.provided.info().short_name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .start(instance, &self.provided)
            .map_err(|source| ArborError::LifecycleFailed {
                key: self.key.clone(),
                phase: "start",
                source,
            })
    }

    fn stop_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .stop(instance, &self.provided)
            .map_err(|source| ArborError::LifecycleFailed {
                key: self.key.clone(),
                phase: "stop",
                source,
            })
    }

    fn dispose_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .dispose(instance, &self.provided)
            .map_err(|source| ArborError::LifecycleFailed {
                key: self.key.clone(),
                phase: "dispose",
                source,
            })
    }

    fn type_has_lifecycle(&self) -> bool {
        self.lifecycle.has_lifecycle(&self.provided)
    }
}

//! Implementation hiding.
//!
//! A hidden component can only be reached through its declared capability
//! views: requests for the concrete type no longer match it, and callers who
//! want call-level dispatch go through a [`Proxy`].

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::intercepting::Interceptors;
use crate::adapter::{ComponentAdapter, CycleGuard, ResolutionContext};
use crate::container::Container;
use crate::error::{ArborError, Result};
use crate::implementation::{Implementation, Instance};
use crate::key::{ComponentKey, TypeInfo};

/// Exposes only the delegate's capability views.
pub struct HiddenImplementation {
    delegate: Arc<dyn ComponentAdapter>,
    hidden: Implementation,
    interceptors: Option<Arc<Interceptors>>,
}

impl HiddenImplementation {
    pub fn new(delegate: Arc<dyn ComponentAdapter>) -> Self {
        let hidden = delegate.implementation().hidden();
        Self {
            delegate,
            hidden,
            interceptors: None,
        }
    }

    /// Hiding with pre/post hooks applied by [`Proxy::invoke`].
    pub fn intercepted(delegate: Arc<dyn ComponentAdapter>, interceptors: Arc<Interceptors>) -> Self {
        Self {
            interceptors: Some(interceptors),
            ..Self::new(delegate)
        }
    }

    pub fn interceptors(&self) -> Option<&Arc<Interceptors>> {
        self.interceptors.as_ref()
    }
}

impl ComponentAdapter for HiddenImplementation {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        &self.hidden
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        self.delegate.produce(ctx)
    }

    fn descriptor(&self) -> String {
        match self.interceptors {
            Some(_) => "Intercepted".to_string(),
            None => "Hidden".to_string(),
        }
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Call-level handle on a hidden component, viewed as `I`.
///
/// Every [`invoke`](Proxy::invoke) fetches the current instance from the
/// adapter, so a flushed or thread-stored component is re-resolved.
pub struct Proxy<I: ?Sized> {
    container: Container,
    adapter: Arc<dyn ComponentAdapter>,
    interceptors: Option<Arc<Interceptors>>,
    _capability: PhantomData<fn() -> Arc<I>>,
}

impl<I: ?Sized + 'static> Proxy<I> {
    pub(crate) fn new(
        container: Container,
        adapter: Arc<dyn ComponentAdapter>,
        interceptors: Option<Arc<Interceptors>>,
    ) -> Self {
        Self {
            container,
            adapter,
            interceptors,
            _capability: PhantomData,
        }
    }

    pub fn key(&self) -> &ComponentKey {
        self.adapter.key()
    }

    /// The current instance behind the proxy, viewed as `I`.
    pub fn target(&self) -> Result<Arc<I>> {
        self.resolve().map(|(_, target)| target)
    }

    /// Calls `call` on the current instance, running any hooks around it.
    pub fn invoke<R, F>(&self, call: F) -> Result<R>
    where
        F: Fn(&I) -> R,
        R: Clone + Send + Sync + 'static,
    {
        let (instance, target) = self.resolve()?;
        Ok(match &self.interceptors {
            Some(interceptors) => interceptors.intercept::<I, R>(&instance, &*target, &call),
            None => call(&*target),
        })
    }

    fn resolve(&self) -> Result<(Instance, Arc<I>)> {
        let guard = CycleGuard::new();
        let ctx = ResolutionContext::new(&self.container, &guard);
        let component = self.container.produce_resolved(&self.adapter, &ctx)?;
        let target = component
            .cast::<I>()
            .ok_or_else(|| ArborError::NotAssignable {
                key: self.adapter.key().clone(),
                requested: TypeInfo::of::<I>(),
            })?;
        Ok((component.instance, target))
    }
}

impl<I: ?Sized> fmt::Debug for Proxy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("key", self.adapter.key())
            .field("intercepted", &self.interceptors.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InstanceAdapter;
    use crate::implementation::Value;
    use crate::lifecycle::NullLifecycleStrategy;
    use crate::monitor::null_monitor;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct Fixed(u64);

    impl Clock for Fixed {
        fn now(&self) -> u64 {
            self.0
        }
    }

    fn clock() -> Arc<dyn ComponentAdapter> {
        Arc::new(InstanceAdapter::new(
            ComponentKey::from("clock"),
            Value::new(Fixed(42)).implements::<dyn Clock>(|c| c).into(),
            Arc::new(NullLifecycleStrategy),
            null_monitor(),
        ))
    }

    #[test]
    fn concrete_type_is_no_longer_assignable() {
        let hidden = HiddenImplementation::new(clock());
        assert!(!hidden.implementation().is_assignable_to(&TypeInfo::of::<Fixed>()));
        assert!(hidden.implementation().is_assignable_to(&TypeInfo::of::<dyn Clock>()));
        assert_eq!(hidden.descriptor(), "Hidden");
    }

    #[test]
    fn produced_instance_is_unchanged() {
        let container = Container::new();
        let guard = CycleGuard::new();
        let hidden = HiddenImplementation::new(clock());

        let instance = hidden
            .produce(&ResolutionContext::new(&container, &guard))
            .unwrap();
        assert!(instance.downcast_ref::<Fixed>().is_some());
        assert!(hidden.implementation().cast::<Fixed>(&instance).is_none());
    }
}

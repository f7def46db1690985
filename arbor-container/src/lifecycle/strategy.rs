//! Lifecycle strategies decide whether and when components are started,
//! stopped and disposed.

use crate::adapter::ComponentAdapter;
use crate::implementation::{BoxError, Implementation, Instance};
use crate::key::TypeInfo;

/// Component-level lifecycle policy.
///
/// The container drives *when* lifecycle phases happen; the strategy decides
/// what a phase means for a particular component.
pub trait LifecycleStrategy: Send + Sync {
    fn start(&self, instance: &Instance, implementation: &Implementation) -> Result<(), BoxError>;

    fn stop(&self, instance: &Instance, implementation: &Implementation) -> Result<(), BoxError>;

    fn dispose(&self, instance: &Instance, implementation: &Implementation)
    -> Result<(), BoxError>;

    /// Whether components of this implementation take part in the lifecycle.
    fn has_lifecycle(&self, implementation: &Implementation) -> bool;

    /// Whether the container starts the adapter when the container starts.
    fn called_after_context_start(&self, _adapter: &dyn ComponentAdapter) -> bool {
        true
    }

    /// Whether a component is started as soon as it is handed out.
    fn called_after_construction(&self, _adapter: &dyn ComponentAdapter) -> bool {
        false
    }
}

/// Capability for components with start/stop hooks.
pub trait Startable: Send + Sync {
    fn start(&self) -> Result<(), BoxError>;
    fn stop(&self) -> Result<(), BoxError>;
}

/// Capability for components that release resources on dispose.
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Drives [`Startable`] and [`Disposable`] capabilities.
///
/// A component takes part when its implementation declares either view,
/// e.g. `Constructor::new(..).implements::<dyn Startable>(|c| c)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartableLifecycleStrategy {
    start_on_construction: bool,
}

impl StartableLifecycleStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start components the first time they are handed out, not only when
    /// the container starts.
    pub fn start_on_construction(mut self) -> Self {
        self.start_on_construction = true;
        self
    }
}

impl LifecycleStrategy for StartableLifecycleStrategy {
    fn start(&self, instance: &Instance, implementation: &Implementation) -> Result<(), BoxError> {
        match implementation.cast::<dyn Startable>(instance) {
            Some(startable) => startable.start(),
            None => Ok(()),
        }
    }

    fn stop(&self, instance: &Instance, implementation: &Implementation) -> Result<(), BoxError> {
        match implementation.cast::<dyn Startable>(instance) {
            Some(startable) => startable.stop(),
            None => Ok(()),
        }
    }

    fn dispose(
        &self,
        instance: &Instance,
        implementation: &Implementation,
    ) -> Result<(), BoxError> {
        match implementation.cast::<dyn Disposable>(instance) {
            Some(disposable) => disposable.dispose(),
            None => Ok(()),
        }
    }

    fn has_lifecycle(&self, implementation: &Implementation) -> bool {
        implementation.is_assignable_to(&TypeInfo::of::<dyn Startable>())
            || implementation.is_assignable_to(&TypeInfo::of::<dyn Disposable>())
    }

    fn called_after_construction(&self, _adapter: &dyn ComponentAdapter) -> bool {
        self.start_on_construction
    }
}

/// Lifecycle strategy that never does anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLifecycleStrategy;

impl LifecycleStrategy for NullLifecycleStrategy {
    fn start(&self, _: &Instance, _: &Implementation) -> Result<(), BoxError> {
        Ok(())
    }

    fn stop(&self, _: &Instance, _: &Implementation) -> Result<(), BoxError> {
        Ok(())
    }

    fn dispose(&self, _: &Instance, _: &Implementation) -> Result<(), BoxError> {
        Ok(())
    }

    fn has_lifecycle(&self, _: &Implementation) -> bool {
        false
    }
}

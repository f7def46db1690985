//! Adapters around instances that already exist.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::ComponentAdapter;
use super::ResolutionContext;
use crate::container::Container;
use crate::error::{ArborError, Result};
use crate::implementation::{BoxError, Component, Implementation, Instance};
use crate::key::ComponentKey;
use crate::lifecycle::LifecycleStrategy;
use crate::monitor::ComponentMonitor;

#[derive(Default)]
struct InstanceState {
    started: bool,
    disposed: bool,
}

/// Registration of a pre-built instance.
///
/// The instance takes part in the container lifecycle when the lifecycle
/// strategy says its type has one.
pub struct InstanceAdapter {
    key: ComponentKey,
    component: Component,
    lifecycle: Arc<dyn LifecycleStrategy>,
    monitor: RwLock<Arc<dyn ComponentMonitor>>,
    state: Mutex<InstanceState>,
}

impl InstanceAdapter {
    pub fn new(
        key: ComponentKey,
        component: Component,
        lifecycle: Arc<dyn LifecycleStrategy>,
        monitor: Arc<dyn ComponentMonitor>,
    ) -> Self {
        Self {
            key,
            component,
            lifecycle,
            monitor: RwLock::new(monitor),
            state: Mutex::new(InstanceState::default()),
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.component.instance
    }

    fn failed(&self, phase: &'static str, source: BoxError) -> ArborError {
        let err = ArborError::LifecycleFailed {
            key: self.key.clone(),
            phase,
            source,
        };
        self.monitor
            .read()
            .lifecycle_invocation_failed(&self.key, phase, &err);
        err
    }

    fn state_error(&self, problem: &'static str) -> ArborError {
        ArborError::ComponentState {
            key: self.key.clone(),
            problem,
        }
    }
}

impl ComponentAdapter for InstanceAdapter {
    fn key(&self) -> &ComponentKey {
        &self.key
    }

    fn implementation(&self) -> &Implementation {
        &self.component.implementation
    }

    fn produce(&self, _ctx: &ResolutionContext<'_>) -> Result<Instance> {
        Ok(self.component.instance.clone())
    }

    fn descriptor(&self) -> String {
        "Instance".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&self, _container: &Container) -> Result<()> {
        if !self.has_lifecycle() {
            return Ok(());
        }
        {
            let state = self.state.lock();
            if state.disposed {
                return Err(self.state_error("already disposed"));
            }
            if state.started {
                return Err(self.state_error("already started"));
            }
        }
        self.start_component(&self.component.instance)?;
        self.state.lock().started = true;
        Ok(())
    }

    fn stop(&self, _container: &Container) -> Result<()> {
        if !self.has_lifecycle() {
            return Ok(());
        }
        {
            let state = self.state.lock();
            if state.disposed {
                return Err(self.state_error("already disposed"));
            }
            if !state.started {
                return Err(self.state_error("not started"));
            }
        }
        self.stop_component(&self.component.instance)?;
        self.state.lock().started = false;
        Ok(())
    }

    fn dispose(&self, _container: &Container) -> Result<()> {
        if !self.has_lifecycle() {
            return Ok(());
        }
        if self.state.lock().disposed {
            return Err(self.state_error("already disposed"));
        }
        self.dispose_component(&self.component.instance)?;
        self.state.lock().disposed = true;
        Ok(())
    }

    fn has_lifecycle(&self) -> bool {
        self.type_has_lifecycle()
    }

    fn is_started(&self) -> bool {
        self.state.lock().started
    }

    fn start_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .start(instance, &self.component.implementation)
            .map_err(|source| self.failed("start", source))
    }

    fn stop_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .stop(instance, &self.component.implementation)
            .map_err(|source| self.failed("stop", source))
    }

    fn dispose_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .dispose(instance, &self.component.implementation)
            .map_err(|source| self.failed("dispose", source))
    }

    fn type_has_lifecycle(&self) -> bool {
        self.lifecycle.has_lifecycle(&self.component.implementation)
    }

    fn change_monitor(&self, monitor: Arc<dyn ComponentMonitor>) -> Arc<dyn ComponentMonitor> {
        std::mem::replace(&mut *self.monitor.write(), monitor)
    }

    fn current_monitor(&self) -> Result<Arc<dyn ComponentMonitor>> {
        Ok(self.monitor.read().clone())
    }
}

/// A fallback instance supplied by a monitor when nothing was registered.
///
/// Never part of the container lifecycle and never recorded as started.
pub struct LateInstance {
    key: ComponentKey,
    component: Component,
}

impl LateInstance {
    pub fn new(key: ComponentKey, component: Component) -> Self {
        Self { key, component }
    }
}

impl ComponentAdapter for LateInstance {
    fn key(&self) -> &ComponentKey {
        &self.key
    }

    fn implementation(&self) -> &Implementation {
        &self.component.implementation
    }

    fn produce(&self, _ctx: &ResolutionContext<'_>) -> Result<Instance> {
        Ok(self.component.instance.clone())
    }

    fn descriptor(&self) -> String {
        "LateInstance".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Component monitors observe the container at fixed extension points.
//!
//! A monitor never changes control flow, with two exceptions: it may supply a
//! late instance when nothing is registered under a key, and it may wrap a
//! freshly built adapter in one more layer.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, trace, warn};

use crate::adapter::ComponentAdapter;
use crate::container::Container;
use crate::error::ArborError;
use crate::implementation::{Component, Implementation};
use crate::key::ComponentKey;

/// Observer consulted by containers and adapters.
pub trait ComponentMonitor: Send + Sync {
    fn instantiating(&self, _key: &ComponentKey) {}

    fn instantiated(&self, _key: &ComponentKey, _implementation: &Implementation, _elapsed: Duration) {
    }

    fn instantiation_failed(&self, _key: &ComponentKey, _error: &ArborError) {}

    fn lifecycle_invocation_failed(&self, _key: &ComponentKey, _phase: &str, _error: &ArborError) {}

    /// Last-resort fallback when nothing is registered under `key`.
    fn no_component_found(&self, _container: &Container, _key: &ComponentKey) -> Option<Component> {
        None
    }

    /// Chance to wrap every adapter the pipeline builds.
    fn changed_behavior(&self, adapter: Arc<dyn ComponentAdapter>) -> Arc<dyn ComponentAdapter> {
        adapter
    }
}

/// Monitor that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullComponentMonitor;

impl ComponentMonitor for NullComponentMonitor {}

static NULL_MONITOR: Lazy<Arc<dyn ComponentMonitor>> = Lazy::new(|| Arc::new(NullComponentMonitor));

/// Shared [`NullComponentMonitor`].
pub fn null_monitor() -> Arc<dyn ComponentMonitor> {
    NULL_MONITOR.clone()
}

/// Monitor that reports every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingComponentMonitor;

impl ComponentMonitor for TracingComponentMonitor {
    fn instantiating(&self, key: &ComponentKey) {
        trace!(key = %key.short(), "Instantiating");
    }

    fn instantiated(&self, key: &ComponentKey, implementation: &Implementation, elapsed: Duration) {
        debug!(
            key = %key.short(),
            implementation = %implementation.info().short_name(),
            elapsed_us = elapsed.as_micros() as u64,
            "Instantiated"
        );
    }

    fn instantiation_failed(&self, key: &ComponentKey, error: &ArborError) {
        warn!(key = %key.short(), %error, "Instantiation failed");
    }

    fn lifecycle_invocation_failed(&self, key: &ComponentKey, phase: &str, error: &ArborError) {
        warn!(key = %key.short(), phase, %error, "Lifecycle invocation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_monitor_is_shared() {
        let a = null_monitor();
        let b = null_monitor();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn default_fallback_finds_nothing() {
        let container = Container::new();
        let monitor = NullComponentMonitor;
        assert!(
            monitor
                .no_component_found(&container, &ComponentKey::from("missing"))
                .is_none()
        );
    }
}

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::{ArborError, Result};
use crate::implementation::{BoxError, Instance, Implementation};
use crate::key::ComponentKey;

/// Capability a guard component exposes to approve production.
pub trait Precondition: Send + Sync {
    fn check(&self) -> std::result::Result<(), BoxError>;
}

/// Produces the delegate only while the guard component allows it.
///
/// The guard is looked up by key in the resolution context on every
/// production. A guard without the [`Precondition`] capability approves by
/// being present.
pub struct Guarded {
    delegate: Arc<dyn ComponentAdapter>,
    guard: ComponentKey,
}

impl Guarded {
    pub fn new(delegate: Arc<dyn ComponentAdapter>, guard: ComponentKey) -> Self {
        Self { delegate, guard }
    }

    pub fn guard(&self) -> &ComponentKey {
        &self.guard
    }
}

impl ComponentAdapter for Guarded {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let guard = ctx
            .container()
            .lookup(&self.guard, ctx)?
            .ok_or_else(|| ArborError::unsatisfied(&self.guard))?;

        if let Some(precondition) = guard.cast::<dyn Precondition>() {
            if let Err(source) = precondition.check() {
                debug!(key = %self.key().short(), guard = %self.guard.short(), "Guard rejected production");
                return Err(ArborError::GuardRejected {
                    key: self.key().clone(),
                    guard: self.guard.clone(),
                    source,
                });
            }
        }

        self.delegate.produce(ctx)
    }

    fn descriptor(&self) -> String {
        format!("Guarded({})", self.guard.short())
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

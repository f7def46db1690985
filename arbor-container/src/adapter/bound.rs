use std::any::Any;
use std::sync::Arc;

use super::{ComponentAdapter, ResolutionContext};
use crate::container::Container;
use crate::error::Result;
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

/// A parent's adapter as seen from a child.
///
/// Remembers which container owns the component so the child never ends up
/// as the resolution context for a parent-owned component.
pub struct BoundAdapter {
    delegate: Arc<dyn ComponentAdapter>,
    container: Container,
}

impl BoundAdapter {
    pub fn new(delegate: Arc<dyn ComponentAdapter>, container: Container) -> Self {
        Self {
            delegate,
            container,
        }
    }

    /// The owning container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn inner(&self) -> &Arc<dyn ComponentAdapter> {
        &self.delegate
    }
}

impl ComponentAdapter for BoundAdapter {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        self.delegate.produce(&ctx.with_container(&self.container))
    }

    fn verify(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        self.delegate.verify(&ctx.with_container(&self.container))
    }

    fn descriptor(&self) -> String {
        self.delegate.descriptor()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&self, _container: &Container) -> Result<()> {
        self.delegate.start(&self.container)
    }

    fn stop(&self, _container: &Container) -> Result<()> {
        self.delegate.stop(&self.container)
    }

    fn dispose(&self, _container: &Container) -> Result<()> {
        self.delegate.dispose(&self.container)
    }
}

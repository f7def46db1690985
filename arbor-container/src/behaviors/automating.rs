use std::any::Any;
use std::sync::Arc;

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::Result;
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

/// Marks a component for eager instantiation when its container starts,
/// even if nothing depends on it.
pub struct Automated {
    delegate: Arc<dyn ComponentAdapter>,
}

impl Automated {
    pub fn new(delegate: Arc<dyn ComponentAdapter>) -> Self {
        Self { delegate }
    }
}

impl ComponentAdapter for Automated {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        self.delegate.produce(ctx)
    }

    fn descriptor(&self) -> String {
        "Automated".to_string()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_lifecycle(&self) -> bool {
        true
    }

    fn type_has_lifecycle(&self) -> bool {
        true
    }
}

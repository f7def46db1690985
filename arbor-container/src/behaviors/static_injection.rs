use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::Result;
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

/// Types whose static members are already initialized.
///
/// Shared by every container built from one pipeline.
#[derive(Debug, Default)]
pub struct StaticsInitialized {
    types: Mutex<HashSet<TypeId>>,
}

impl StaticsInitialized {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.types.lock().contains(&type_id)
    }

    /// Marks `type_id`. Returns false when it was already marked.
    fn claim(&self, type_id: TypeId) -> bool {
        self.types.lock().insert(type_id)
    }

    fn release(&self, type_id: TypeId) {
        self.types.lock().remove(&type_id);
    }
}

/// Outermost layer: initializes the implementation's static members once
/// per type, before the first production.
pub struct StaticInjection {
    delegate: Arc<dyn ComponentAdapter>,
    initialized: Arc<StaticsInitialized>,
}

impl StaticInjection {
    pub fn new(delegate: Arc<dyn ComponentAdapter>, initialized: Arc<StaticsInitialized>) -> Self {
        Self {
            delegate,
            initialized,
        }
    }

    fn inject_statics(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        let implementation = self.delegate.implementation();
        if !implementation.has_statics() {
            return Ok(());
        }

        let type_id = implementation.info().type_id();
        if !self.initialized.claim(type_id) {
            return Ok(());
        }

        debug!(implementation = %implementation.info().short_name(), "Injecting static members");
        implementation.inject_statics(ctx).inspect_err(|_| {
            self.initialized.release(type_id);
        })
    }
}

impl ComponentAdapter for StaticInjection {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        self.inject_statics(ctx)?;
        self.delegate.produce(ctx)
    }

    fn descriptor(&self) -> String {
        "StaticInjection".to_string()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Applies string-valued properties onto a freshly produced instance.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::{ArborError, Result};
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

/// Sets configured properties through the implementation's named setters
/// after every production.
///
/// Reach it through [`find_adapter`](crate::adapter::find_adapter) on the
/// registered adapter to configure values.
pub struct PropertyApplicator {
    delegate: Arc<dyn ComponentAdapter>,
    properties: RwLock<BTreeMap<String, String>>,
}

impl PropertyApplicator {
    pub fn new(delegate: Arc<dyn ComponentAdapter>) -> Self {
        Self {
            delegate,
            properties: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fails when the implementation has no setter called `name`.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self
            .delegate
            .implementation()
            .property_names()
            .any(|known| known == name)
        {
            return Err(self.unknown(&name));
        }
        self.properties.write().insert(name, value.into());
        Ok(())
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        self.properties.read().clone()
    }

    fn unknown(&self, name: &str) -> ArborError {
        let known: Vec<&str> = self.delegate.implementation().property_names().collect();
        ArborError::Composition(format!(
            "{} has no property '{name}' (known: {})",
            self.key(),
            known.join(", ")
        ))
    }
}

impl ComponentAdapter for PropertyApplicator {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let instance = self.delegate.produce(ctx)?;
        let properties = self.properties.read().clone();
        let implementation = self.delegate.implementation();

        for (name, value) in &properties {
            trace!(key = %self.key().short(), property = %name, "Applying property");
            match implementation.apply_property(&instance, name, value) {
                Some(Ok(())) => {}
                Some(Err(source)) => {
                    return Err(ArborError::ConstructionFailed {
                        key: self.key().clone(),
                        source,
                    });
                }
                None => return Err(self.unknown(name)),
            }
        }
        Ok(instance)
    }

    fn descriptor(&self) -> String {
        "PropertyApplied".to_string()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

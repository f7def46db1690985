//! Adapter registry: what one container has registered.
//!
//! Keeps three views of the same adapters: registration order, a key index,
//! and the order of first successful instantiation (used reversed for
//! teardown).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::adapter::ComponentAdapter;
use crate::error::{ArborError, DuplicateKeyError, Result};
use crate::key::ComponentKey;

#[derive(Default)]
pub(crate) struct AdapterRegistry {
    adapters: Vec<Arc<dyn ComponentAdapter>>,
    index: HashMap<ComponentKey, Arc<dyn ComponentAdapter>>,
    ordered: Vec<Arc<dyn ComponentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter under its key.
    ///
    /// # Errors
    /// [`ArborError::DuplicateKey`] when the key is taken; the registry is
    /// left unchanged.
    pub fn register(&mut self, adapter: Arc<dyn ComponentAdapter>) -> Result<()> {
        let key = adapter.key().clone();
        if self.index.contains_key(&key) {
            return Err(ArborError::DuplicateKey(DuplicateKeyError { key }));
        }

        debug!(key = %key.short(), stack = %adapter.descriptor(), "Registered component");
        self.index.insert(key, adapter.clone());
        self.adapters.push(adapter);
        Ok(())
    }

    /// Drops the adapter under `key` from every view.
    pub fn remove(&mut self, key: &ComponentKey) -> Option<Arc<dyn ComponentAdapter>> {
        let adapter = self.index.remove(key)?;
        self.adapters.retain(|a| !same(a, &adapter));
        self.ordered.retain(|a| !same(a, &adapter));
        debug!(key = %key.short(), "Removed component");
        Some(adapter)
    }

    pub fn get(&self, key: &ComponentKey) -> Option<Arc<dyn ComponentAdapter>> {
        self.index.get(key).cloned()
    }

    /// Registration order.
    pub fn all(&self) -> Vec<Arc<dyn ComponentAdapter>> {
        self.adapters.clone()
    }

    /// Whether this exact adapter (not just its key) is registered here.
    pub fn contains(&self, adapter: &Arc<dyn ComponentAdapter>) -> bool {
        self.index
            .get(adapter.key())
            .is_some_and(|registered| same(registered, adapter))
    }

    /// Records a first successful instantiation. Idempotent.
    pub fn add_ordered(&mut self, adapter: Arc<dyn ComponentAdapter>) {
        if !self.ordered.iter().any(|a| same(a, &adapter)) {
            trace!(key = %adapter.key().short(), position = self.ordered.len(), "Ordered adapter");
            self.ordered.push(adapter);
        }
    }

    /// First-instantiation order.
    pub fn ordered(&self) -> Vec<Arc<dyn ComponentAdapter>> {
        self.ordered.clone()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> + '_ {
        self.adapters.iter().map(|a| a.key())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

/// Adapter identity, ignoring vtables.
pub(crate) fn same(a: &Arc<dyn ComponentAdapter>, b: &Arc<dyn ComponentAdapter>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

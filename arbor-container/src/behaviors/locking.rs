//! Mutual exclusion around production.
//!
//! Both layers serialize concurrent `produce` calls on the wrapped adapter
//! and nothing else. The locks are reentrant so a component resolved twice
//! on one call reports a cycle instead of deadlocking.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::adapter::{ComponentAdapter, ResolutionContext};
use crate::error::Result;
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

/// Serializes production with an intrinsic lock.
pub struct Synchronized {
    delegate: Arc<dyn ComponentAdapter>,
    lock: ReentrantMutex<()>,
}

impl Synchronized {
    pub fn new(delegate: Arc<dyn ComponentAdapter>) -> Self {
        Self {
            delegate,
            lock: ReentrantMutex::new(()),
        }
    }
}

impl ComponentAdapter for Synchronized {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let _guard = self.lock.lock();
        self.delegate.produce(ctx)
    }

    fn verify(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        let _guard = self.lock.lock();
        self.delegate.verify(ctx)
    }

    fn descriptor(&self) -> String {
        "Synchronized".to_string()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Serializes production with a fair lock: waiting threads are served in
/// arrival order.
pub struct Locked {
    delegate: Arc<dyn ComponentAdapter>,
    lock: ReentrantMutex<()>,
}

impl Locked {
    pub fn new(delegate: Arc<dyn ComponentAdapter>) -> Self {
        Self {
            delegate,
            lock: ReentrantMutex::new(()),
        }
    }
}

impl ComponentAdapter for Locked {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let guard = self.lock.lock();
        let produced = self.delegate.produce(ctx);
        ReentrantMutexGuard::unlock_fair(guard);
        produced
    }

    fn descriptor(&self) -> String {
        "Locked".to_string()
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Caching and storing: memoize the delegate's instance.
//!
//! [`Stored`] is one adapter type with two kinds of slot: a plain slot living
//! as long as the adapter (caching), or a slot in the calling thread's table
//! of a shared [`Store`] (storing).

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::storing::{Slot, Store};
use crate::adapter::{ComponentAdapter, CycleGuard, ResolutionContext};
use crate::container::Container;
use crate::error::{ArborError, Result};
use crate::implementation::{Implementation, Instance};
use crate::key::ComponentKey;

enum Reference {
    Simple(Mutex<Slot>),
    Thread(Arc<Store>),
}

/// Memoizing layer with component-level lifecycle bookkeeping.
///
/// When the delegate's type has a lifecycle, the cached instance is started,
/// stopped and disposed at most once per transition and misuse is reported
/// as [`ArborError::ComponentState`].
pub struct Stored {
    delegate: Arc<dyn ComponentAdapter>,
    reference: Reference,
    real_lifecycle: bool,
}

impl Stored {
    /// One instance for the lifetime of this adapter.
    pub fn cached(delegate: Arc<dyn ComponentAdapter>) -> Self {
        Self::with_reference(delegate, Reference::Simple(Mutex::new(Slot::default())))
    }

    /// One instance per calling thread, kept in `store`.
    pub fn stored(delegate: Arc<dyn ComponentAdapter>, store: Arc<Store>) -> Self {
        Self::with_reference(delegate, Reference::Thread(store))
    }

    fn with_reference(delegate: Arc<dyn ComponentAdapter>, reference: Reference) -> Self {
        let real_lifecycle = delegate.type_has_lifecycle();
        Self {
            delegate,
            reference,
            real_lifecycle,
        }
    }

    /// The memoized instance, if one was produced (on this thread, for storing).
    pub fn stored_instance(&self) -> Option<Instance> {
        self.with_slot(|slot| slot.instance.clone()).flatten()
    }

    /// Stops and disposes the memoized instance if it was started, then
    /// clears the slot so the next request produces a fresh instance.
    pub fn flush(&self) -> Result<()> {
        let slot = match &self.reference {
            Reference::Simple(slot) => std::mem::take(&mut *slot.lock()),
            Reference::Thread(store) => store.remove_slot(self.key()).unwrap_or_default(),
        };

        if let Some(instance) = slot.instance {
            debug!(key = %self.key().short(), started = slot.started, "Flushing cached instance");
            if slot.started {
                self.delegate.stop_component(&instance)?;
                self.delegate.dispose_component(&instance)?;
            }
        }
        Ok(())
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        match &self.reference {
            Reference::Simple(slot) => Some(f(&mut slot.lock())),
            Reference::Thread(store) => store.with_slot(self.delegate.key(), f),
        }
    }

    fn slot(&self) -> Slot {
        self.with_slot(|slot| slot.clone()).unwrap_or_default()
    }

    fn state_error(&self, problem: &'static str) -> ArborError {
        ArborError::ComponentState {
            key: self.key().clone(),
            problem,
        }
    }
}

impl ComponentAdapter for Stored {
    fn key(&self) -> &ComponentKey {
        self.delegate.key()
    }

    fn implementation(&self) -> &Implementation {
        self.delegate.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        if let Some(instance) = self.stored_instance() {
            return Ok(instance);
        }

        // Never hold the slot while producing: the delegate may resolve
        // other components stored in the same table.
        let produced = self.delegate.produce(ctx)?;
        let kept = self.with_slot(|slot| {
            slot.instance
                .get_or_insert_with(|| produced.clone())
                .clone()
        });
        Ok(kept.unwrap_or(produced))
    }

    fn descriptor(&self) -> String {
        let kind = match self.reference {
            Reference::Simple(_) => "Cached",
            Reference::Thread(_) => "Stored",
        };
        if self.real_lifecycle {
            format!("{kind}+Lifecycle")
        } else {
            kind.to_string()
        }
    }

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        Some(self.delegate.as_ref())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&self, container: &Container) -> Result<()> {
        if !self.real_lifecycle {
            return Ok(());
        }
        let slot = self.slot();
        if slot.disposed {
            return Err(self.state_error("already disposed"));
        }
        if slot.started {
            return Err(self.state_error("already started"));
        }

        let guard = CycleGuard::new();
        let instance = self.produce(&ResolutionContext::new(container, &guard))?;
        self.delegate.start_component(&instance)?;
        self.with_slot(|slot| slot.started = true);
        Ok(())
    }

    fn stop(&self, _container: &Container) -> Result<()> {
        if !self.real_lifecycle {
            return Ok(());
        }
        let slot = self.slot();
        if slot.disposed {
            return Err(self.state_error("already disposed"));
        }
        let Some(instance) = slot.instance else {
            return Err(self.state_error("not instantiated"));
        };
        if !slot.started {
            return Err(self.state_error("not started"));
        }

        self.delegate.stop_component(&instance)?;
        self.with_slot(|slot| slot.started = false);
        Ok(())
    }

    fn dispose(&self, _container: &Container) -> Result<()> {
        if !self.real_lifecycle {
            return Ok(());
        }
        let slot = self.slot();
        if let Some(instance) = slot.instance {
            if slot.disposed {
                return Err(self.state_error("already disposed"));
            }
            self.delegate.dispose_component(&instance)?;
            self.with_slot(|slot| slot.disposed = true);
        }
        Ok(())
    }

    fn has_lifecycle(&self) -> bool {
        self.real_lifecycle
    }

    fn is_started(&self) -> bool {
        self.real_lifecycle && self.slot().started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Constructor, InjectorAdapter};
    use crate::implementation::BoxError;
    use crate::lifecycle::{
        LifecycleStrategy, NullLifecycleStrategy, Startable, StartableLifecycleStrategy,
    };
    use crate::monitor::null_monitor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Widget;

    #[derive(Default)]
    struct Engine {
        stops: AtomicUsize,
    }

    impl Startable for Engine {
        fn start(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        fn stop(&self) -> std::result::Result<(), BoxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn base<T: Send + Sync + 'static>(
        injector: Constructor<T>,
        lifecycle: Arc<dyn LifecycleStrategy>,
    ) -> Arc<dyn ComponentAdapter> {
        Arc::new(
            InjectorAdapter::new(
                ComponentKey::of::<T>(),
                Arc::new(injector),
                lifecycle,
                null_monitor(),
                false,
            )
            .unwrap(),
        )
    }

    fn widget() -> Arc<dyn ComponentAdapter> {
        base(
            Constructor::new(|_| {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(Widget)
            }),
            Arc::new(NullLifecycleStrategy),
        )
    }

    fn engine() -> Arc<dyn ComponentAdapter> {
        base(
            Constructor::new(|_| Ok(Engine::default())).implements::<dyn Startable>(|e| e),
            Arc::new(StartableLifecycleStrategy::new()),
        )
    }

    fn produce(adapter: &dyn ComponentAdapter, container: &Container) -> Instance {
        let guard = CycleGuard::new();
        adapter
            .produce(&ResolutionContext::new(container, &guard))
            .unwrap()
    }

    #[test]
    fn cached_returns_same_instance_until_flushed() {
        let container = Container::new();
        let cached = Stored::cached(widget());

        let a = produce(&cached, &container);
        let b = produce(&cached, &container);
        assert!(Arc::ptr_eq(&a, &b));

        cached.flush().unwrap();
        let c = produce(&cached, &container);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cached.descriptor(), "Cached");
    }

    #[test]
    fn stored_is_per_thread() {
        let container = Container::new();
        let stored = Arc::new(Stored::stored(widget(), Arc::new(Store::new())));

        let here = produce(stored.as_ref(), &container);
        assert!(Arc::ptr_eq(&here, &produce(stored.as_ref(), &container)));

        let other = stored.clone();
        let there = thread::spawn(move || {
            let container = Container::new();
            produce(other.as_ref(), &container)
        })
        .join()
        .unwrap();

        assert!(!Arc::ptr_eq(&here, &there));
        assert_eq!(stored.descriptor(), "Stored");
    }

    #[test]
    fn lifecycle_guards() {
        let container = Container::new();
        let cached = Stored::cached(engine());
        assert_eq!(cached.descriptor(), "Cached+Lifecycle");

        match cached.stop(&container) {
            Err(ArborError::ComponentState { problem, .. }) => {
                assert_eq!(problem, "not instantiated")
            }
            other => panic!("Expected ComponentState, got: {other:?}"),
        }

        cached.start(&container).unwrap();
        assert!(cached.is_started());
        assert!(cached.start(&container).is_err());

        cached.stop(&container).unwrap();
        match cached.stop(&container) {
            Err(ArborError::ComponentState { problem, .. }) => assert_eq!(problem, "not started"),
            other => panic!("Expected ComponentState, got: {other:?}"),
        }

        cached.dispose(&container).unwrap();
        match cached.start(&container) {
            Err(ArborError::ComponentState { problem, .. }) => {
                assert_eq!(problem, "already disposed")
            }
            other => panic!("Expected ComponentState, got: {other:?}"),
        }
    }

    #[test]
    fn flush_stops_started_instances() {
        let container = Container::new();
        let cached = Stored::cached(engine());
        cached.start(&container).unwrap();

        let instance = cached.stored_instance().unwrap();
        cached.flush().unwrap();

        let engine = instance.downcast_ref::<Engine>().unwrap();
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert!(cached.stored_instance().is_none());
        assert!(!cached.is_started());
    }

    #[test]
    fn plain_types_skip_lifecycle() {
        let container = Container::new();
        let cached = Stored::cached(widget());
        assert!(!cached.has_lifecycle());
        assert!(cached.start(&container).is_ok());
        assert!(cached.stored_instance().is_none());
    }
}

//! Component adapters.
//!
//! An adapter is the container's handle on one registered component: an
//! immutable key, the implementation metadata, and the ability to produce an
//! instance for a [`ResolutionContext`]. Behaviors are adapters that wrap a
//! delegate adapter and add one capability.

mod bound;
mod injector;
mod instance;

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::container::Container;
use crate::error::{ArborError, CyclicDependencyError, Result};
use crate::implementation::{Implementation, Instance};
use crate::key::{ComponentKey, TypeInfo};
use crate::monitor::{ComponentMonitor, null_monitor};

pub use bound::BoundAdapter;
pub use injector::{
    Arguments, Constructor, Dependency, InjectionSite, Injector, InjectorAdapter,
};
pub use instance::{InstanceAdapter, LateInstance};

/// The contract every adapter and behavior implements.
///
/// Defaults forward to [`delegate`](ComponentAdapter::delegate) when there is
/// one, and degrade to no-ops when there is not.
pub trait ComponentAdapter: Send + Sync + 'static {
    fn key(&self) -> &ComponentKey;

    fn implementation(&self) -> &Implementation;

    /// Produces (or returns a memoized) instance.
    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance>;

    /// Checks that everything the component needs is resolvable,
    /// without instantiating anything.
    fn verify(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.verify(ctx),
            None => Ok(()),
        }
    }

    /// Short label for this layer, e.g. `Cached+Lifecycle`.
    fn descriptor(&self) -> String;

    fn delegate(&self) -> Option<&dyn ComponentAdapter> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    // Adapter-level lifecycle, driven by the owning container.

    fn start(&self, container: &Container) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.start(container),
            None => Ok(()),
        }
    }

    fn stop(&self, container: &Container) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.stop(container),
            None => Ok(()),
        }
    }

    fn dispose(&self, container: &Container) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.dispose(container),
            None => Ok(()),
        }
    }

    /// Whether the container should instantiate and start this adapter.
    fn has_lifecycle(&self) -> bool {
        self.delegate().is_some_and(|d| d.has_lifecycle())
    }

    fn is_started(&self) -> bool {
        self.delegate().is_some_and(|d| d.is_started())
    }

    // Component-level lifecycle, applied to one produced instance.

    fn start_component(&self, instance: &Instance) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.start_component(instance),
            None => Ok(()),
        }
    }

    fn stop_component(&self, instance: &Instance) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.stop_component(instance),
            None => Ok(()),
        }
    }

    fn dispose_component(&self, instance: &Instance) -> Result<()> {
        match self.delegate() {
            Some(delegate) => delegate.dispose_component(instance),
            None => Ok(()),
        }
    }

    /// Whether the lifecycle strategy cares about this component's type.
    fn type_has_lifecycle(&self) -> bool {
        self.delegate().is_some_and(|d| d.type_has_lifecycle())
    }

    /// Swaps the monitor. Returns the previous one.
    fn change_monitor(&self, monitor: Arc<dyn ComponentMonitor>) -> Arc<dyn ComponentMonitor> {
        match self.delegate() {
            Some(delegate) => delegate.change_monitor(monitor),
            None => null_monitor(),
        }
    }

    fn current_monitor(&self) -> Result<Arc<dyn ComponentMonitor>> {
        match self.delegate() {
            Some(delegate) => delegate.current_monitor(),
            None => Err(ArborError::Composition(format!(
                "No component monitor found in delegate of {}",
                self.key()
            ))),
        }
    }
}

/// Finds the first layer of type `A` in an adapter's delegate chain.
///
/// ```
/// use std::sync::Arc;
/// use arbor_container::adapter::{find_adapter, ComponentAdapter, InstanceAdapter};
/// use arbor_container::behaviors::Stored;
/// use arbor_container::implementation::Component;
/// use arbor_container::key::ComponentKey;
/// use arbor_container::lifecycle::NullLifecycleStrategy;
/// use arbor_container::monitor::null_monitor;
///
/// let base: Arc<dyn ComponentAdapter> = Arc::new(InstanceAdapter::new(
///     ComponentKey::from("answer"),
///     Component::of(42u32),
///     Arc::new(NullLifecycleStrategy),
///     null_monitor(),
/// ));
/// let cached = Stored::cached(base);
///
/// assert!(find_adapter::<InstanceAdapter>(&cached).is_some());
/// assert!(find_adapter::<Stored>(&cached).is_some());
/// ```
pub fn find_adapter<A: ComponentAdapter>(adapter: &dyn ComponentAdapter) -> Option<&A> {
    let mut current = Some(adapter);
    while let Some(layer) = current {
        if let Some(found) = layer.as_any().downcast_ref::<A>() {
            return Some(found);
        }
        current = layer.delegate();
    }
    None
}

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_adapter_id() -> u64 {
    NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Where an instance is being produced: which container serves as context,
/// which type it is being injected into, and the per-call cycle guard.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    container: &'a Container,
    target: Option<TypeInfo>,
    guard: &'a CycleGuard,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(container: &'a Container, guard: &'a CycleGuard) -> Self {
        Self {
            container,
            target: None,
            guard,
        }
    }

    #[inline]
    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// The type the produced instance is injected into, if any.
    #[inline]
    pub fn target(&self) -> Option<TypeInfo> {
        self.target
    }

    #[inline]
    pub fn guard(&self) -> &'a CycleGuard {
        self.guard
    }

    pub fn with_container<'b>(&self, container: &'b Container) -> ResolutionContext<'b>
    where
        'a: 'b,
    {
        ResolutionContext {
            container,
            target: self.target,
            guard: self.guard,
        }
    }

    pub fn with_target(&self, target: TypeInfo) -> Self {
        Self {
            target: Some(target),
            ..*self
        }
    }
}

/// Tracks in-progress productions for one top-level call.
///
/// Entering an adapter that is already being produced on this call is a
/// cycle.
#[derive(Default)]
pub struct CycleGuard {
    frames: RefCell<Vec<Frame>>,
}

struct Frame {
    adapter: u64,
    implementation: TypeInfo,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, adapter: u64, implementation: TypeInfo) -> Result<CycleEntry<'_>> {
        {
            let frames = self.frames.borrow();
            if let Some(pos) = frames.iter().position(|f| f.adapter == adapter) {
                let mut chain: Vec<TypeInfo> =
                    frames[pos..].iter().map(|f| f.implementation).collect();
                chain.push(implementation);
                warn!(
                    implementation = %implementation.short_name(),
                    depth = frames.len(),
                    "Cyclic dependency detected"
                );
                return Err(ArborError::CyclicDependency(CyclicDependencyError { chain }));
            }
        }

        self.frames.borrow_mut().push(Frame {
            adapter,
            implementation,
        });
        Ok(CycleEntry { guard: self })
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Pops its frame when dropped.
pub struct CycleEntry<'a> {
    guard: &'a CycleGuard,
}

impl Drop for CycleEntry<'_> {
    fn drop(&mut self) {
        self.guard.frames.borrow_mut().pop();
    }
}

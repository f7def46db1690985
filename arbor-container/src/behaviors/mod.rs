//! Behavior decorators and the pipeline that stacks them.
//!
//! Every registration passes through one [`BehaviorPipeline`]. It reads the
//! registration's flags plus the container's always-on behaviors and wraps
//! the base adapter innermost to outermost in a fixed order:
//!
//! ```text
//! base → Synchronized → Locked → PropertyApplicator → Automated
//!      → HiddenImplementation → Stored → Guarded → StaticInjection
//! ```
//!
//! Flags the pipeline recognizes are removed from the working set; whatever
//! is left over is the caller's problem (see
//! [`Properties::ensure_consumed`]).

mod automating;
mod caching;
mod guarding;
mod hiding;
mod intercepting;
mod locking;
mod property_applying;
mod static_injection;
mod storing;
mod thread_table;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::adapter::ComponentAdapter;
use crate::error::Result;
use crate::key::ComponentKey;
use crate::monitor::ComponentMonitor;
use crate::properties::{Characteristic, Properties};

pub use automating::Automated;
pub use caching::Stored;
pub use guarding::{Guarded, Precondition};
pub use hiding::{HiddenImplementation, Proxy};
pub use intercepting::{Interceptors, InvocationController};
pub use locking::{Locked, Synchronized};
pub use property_applying::PropertyApplicator;
pub use static_injection::{StaticInjection, StaticsInitialized};
pub use storing::{Store, StoreSnapshot};

/// A behavior applied to every registration of a container.
///
/// Flags on a single registration can switch caching or hiding back off
/// (`NO_CACHE`, `NO_HIDE_IMPL`).
#[derive(Clone)]
pub enum Behavior {
    Caching,
    /// Thread-scoped memoization in the given store.
    Storing(Arc<Store>),
    Synchronizing,
    Locking,
    PropertyApplying,
    Automating,
    ImplementationHiding,
    /// Hiding plus pre/post hooks.
    Intercepting(Arc<Interceptors>),
}

impl Behavior {
    pub fn name(&self) -> &'static str {
        match self {
            Behavior::Caching => "Caching",
            Behavior::Storing(_) => "Storing",
            Behavior::Synchronizing => "Synchronizing",
            Behavior::Locking => "Locking",
            Behavior::PropertyApplying => "PropertyApplying",
            Behavior::Automating => "Automating",
            Behavior::ImplementationHiding => "ImplementationHiding",
            Behavior::Intercepting(_) => "Intercepting",
        }
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which layers one registration gets.
#[derive(Default)]
struct Wanted {
    synchronize: bool,
    lock: bool,
    property_applying: bool,
    automatic: bool,
    hide: bool,
    interceptors: Option<Arc<Interceptors>>,
    cache: bool,
    store: Option<Arc<Store>>,
    guard: Option<ComponentKey>,
}

/// Builds behavior stacks. Shared by a container and its children.
pub struct BehaviorPipeline {
    behaviors: Vec<Behavior>,
    statics: Arc<StaticsInitialized>,
}

impl BehaviorPipeline {
    pub fn new(behaviors: Vec<Behavior>) -> Self {
        Self {
            behaviors,
            statics: Arc::new(StaticsInitialized::new()),
        }
    }

    /// The always-on behaviors.
    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    pub fn statics(&self) -> &Arc<StaticsInitialized> {
        &self.statics
    }

    /// Full stack for a component built by an injector.
    pub fn create(
        &self,
        monitor: &Arc<dyn ComponentMonitor>,
        properties: &mut Properties,
        base: Arc<dyn ComponentAdapter>,
    ) -> Result<Arc<dyn ComponentAdapter>> {
        let static_flag = properties.remove_if_present(Characteristic::STATIC_INJECTION);
        let has_statics = base.implementation().has_statics();

        let mut adapter = if properties.remove_if_present(Characteristic::NONE) {
            base
        } else {
            let wanted = self.wanted(properties, true);
            let mut adapter = base;
            if wanted.synchronize {
                adapter = wrap(monitor, Synchronized::new(adapter));
            }
            if wanted.lock {
                adapter = wrap(monitor, Locked::new(adapter));
            }
            if wanted.property_applying {
                adapter = wrap(monitor, PropertyApplicator::new(adapter));
            }
            if wanted.automatic {
                adapter = wrap(monitor, Automated::new(adapter));
            }
            self.outer_layers(monitor, wanted, adapter)
        };

        if static_flag || has_statics {
            adapter = wrap(monitor, StaticInjection::new(adapter, self.statics.clone()));
        }
        Ok(adapter)
    }

    /// Reduced stack for a ready-made adapter or instance: synchronizing,
    /// hiding, caching and guarding only.
    pub fn adapt(
        &self,
        monitor: &Arc<dyn ComponentMonitor>,
        properties: &mut Properties,
        adapter: Arc<dyn ComponentAdapter>,
    ) -> Result<Arc<dyn ComponentAdapter>> {
        if properties.remove_if_present(Characteristic::NONE) {
            return Ok(adapter);
        }

        let wanted = self.wanted(properties, false);
        let adapter = if wanted.synchronize {
            wrap(monitor, Synchronized::new(adapter))
        } else {
            adapter
        };
        Ok(self.outer_layers(monitor, wanted, adapter))
    }

    /// Drops every thread table of every store this pipeline owns.
    pub fn dispose(&self) {
        for behavior in &self.behaviors {
            if let Behavior::Storing(store) = behavior {
                store.clear();
            }
        }
    }

    fn outer_layers(
        &self,
        monitor: &Arc<dyn ComponentMonitor>,
        wanted: Wanted,
        mut adapter: Arc<dyn ComponentAdapter>,
    ) -> Arc<dyn ComponentAdapter> {
        if wanted.hide {
            adapter = match wanted.interceptors {
                Some(interceptors) => {
                    wrap(monitor, HiddenImplementation::intercepted(adapter, interceptors))
                }
                None => wrap(monitor, HiddenImplementation::new(adapter)),
            };
        }
        if let Some(store) = wanted.store {
            adapter = wrap(monitor, Stored::stored(adapter, store));
        } else if wanted.cache {
            adapter = wrap(monitor, Stored::cached(adapter));
        }
        if let Some(guard) = wanted.guard {
            adapter = wrap(monitor, Guarded::new(adapter, guard));
        }
        adapter
    }

    fn wanted(&self, properties: &mut Properties, full: bool) -> Wanted {
        let mut wanted = Wanted {
            synchronize: properties.remove_if_present(Characteristic::SYNCHRONIZE),
            hide: properties.remove_if_present(Characteristic::HIDE_IMPL),
            cache: properties.remove_if_present(Characteristic::CACHE),
            guard: properties.take(Characteristic::GUARD).map(ComponentKey::named),
            ..Wanted::default()
        };
        if full {
            wanted.lock = properties.remove_if_present(Characteristic::LOCK);
            wanted.property_applying = properties.remove_if_present(Characteristic::PROPERTY_APPLYING);
            wanted.automatic = properties.remove_if_present(Characteristic::AUTOMATIC);
        }
        let no_cache = properties.remove_if_present(Characteristic::NO_CACHE);
        let no_hide = properties.remove_if_present(Characteristic::NO_HIDE_IMPL);

        for behavior in &self.behaviors {
            match behavior {
                Behavior::Caching => wanted.cache = true,
                Behavior::Storing(store) => wanted.store = Some(store.clone()),
                Behavior::Synchronizing => wanted.synchronize = true,
                Behavior::ImplementationHiding => wanted.hide = true,
                Behavior::Intercepting(interceptors) => {
                    wanted.hide = true;
                    wanted.interceptors = Some(interceptors.clone());
                }
                Behavior::Locking if full => wanted.lock = true,
                Behavior::PropertyApplying if full => wanted.property_applying = true,
                Behavior::Automating if full => wanted.automatic = true,
                _ => {}
            }
        }

        if no_cache {
            wanted.cache = false;
            wanted.store = None;
        }
        if no_hide {
            wanted.hide = false;
            wanted.interceptors = None;
        }
        wanted
    }
}

impl Default for BehaviorPipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for BehaviorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorPipeline")
            .field("behaviors", &self.behaviors)
            .finish()
    }
}

fn wrap<A: ComponentAdapter>(
    monitor: &Arc<dyn ComponentMonitor>,
    layer: A,
) -> Arc<dyn ComponentAdapter> {
    let adapter: Arc<dyn ComponentAdapter> = Arc::new(layer);
    trace!(key = %adapter.key().short(), layer = %adapter.descriptor(), "Wrapping behavior");
    monitor.changed_behavior(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Constructor, InjectorAdapter, find_adapter};
    use crate::lifecycle::NullLifecycleStrategy;
    use crate::monitor::null_monitor;

    struct Service;

    fn base() -> Arc<dyn ComponentAdapter> {
        Arc::new(
            InjectorAdapter::new(
                ComponentKey::of::<Service>(),
                Arc::new(Constructor::new(|_| Ok(Service))),
                Arc::new(NullLifecycleStrategy),
                null_monitor(),
                false,
            )
            .unwrap(),
        )
    }

    fn layers(adapter: &dyn ComponentAdapter) -> Vec<String> {
        let mut layers = Vec::new();
        let mut current = Some(adapter);
        while let Some(layer) = current {
            layers.push(layer.descriptor());
            current = layer.delegate();
        }
        layers
    }

    #[test]
    fn layers_follow_fixed_order() {
        let pipeline = BehaviorPipeline::default();
        let mut props = Properties::from([
            Characteristic::CACHE,
            Characteristic::LOCK,
            Characteristic::SYNCHRONIZE,
            Characteristic::HIDE_IMPL,
            Characteristic::AUTOMATIC,
        ])
        .guarded_by("licence");

        let adapter = pipeline.create(&null_monitor(), &mut props, base()).unwrap();
        assert!(props.is_empty());
        assert_eq!(
            layers(adapter.as_ref()),
            vec![
                "Guarded(\"licence\")",
                "Cached",
                "Hidden",
                "Automated",
                "Locked",
                "Synchronized",
                "Constructor<Service>",
            ]
        );
    }

    #[test]
    fn container_behaviors_can_be_negated() {
        let pipeline = BehaviorPipeline::new(vec![Behavior::Caching]);

        let mut cached = Properties::new();
        let adapter = pipeline.create(&null_monitor(), &mut cached, base()).unwrap();
        assert!(find_adapter::<Stored>(adapter.as_ref()).is_some());

        let mut uncached = Properties::from(Characteristic::NO_CACHE);
        let adapter = pipeline.create(&null_monitor(), &mut uncached, base()).unwrap();
        assert!(find_adapter::<Stored>(adapter.as_ref()).is_none());
        assert!(uncached.is_empty());
    }

    #[test]
    fn none_skips_every_behavior() {
        let pipeline = BehaviorPipeline::new(vec![Behavior::Caching, Behavior::Locking]);
        let mut props = Properties::from(Characteristic::NONE);
        let adapter = pipeline.create(&null_monitor(), &mut props, base()).unwrap();
        assert_eq!(layers(adapter.as_ref()), vec!["Constructor<Service>"]);
    }

    #[test]
    fn adapt_ignores_component_only_flags() {
        let pipeline = BehaviorPipeline::default();
        let mut props = Properties::from([Characteristic::CACHE, Characteristic::LOCK]);
        let adapter = pipeline.adapt(&null_monitor(), &mut props, base()).unwrap();

        assert_eq!(layers(adapter.as_ref()), vec!["Cached", "Constructor<Service>"]);
        assert!(props.is(Characteristic::LOCK));
    }

    #[test]
    fn statics_wrap_outermost() {
        let pipeline = BehaviorPipeline::default();
        let injector = Constructor::new(|_| Ok(Service)).static_member(|_| Ok(()));
        let base: Arc<dyn ComponentAdapter> = Arc::new(
            InjectorAdapter::new(
                ComponentKey::of::<Service>(),
                Arc::new(injector),
                Arc::new(NullLifecycleStrategy),
                null_monitor(),
                false,
            )
            .unwrap(),
        );

        let mut props = Properties::from(Characteristic::CACHE);
        let adapter = pipeline.create(&null_monitor(), &mut props, base).unwrap();
        assert_eq!(
            layers(adapter.as_ref()),
            vec!["StaticInjection", "Cached", "Constructor<Service>"]
        );
    }
}

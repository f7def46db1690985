//! # The Container: one node of the composition tree
//!
//! A container owns the adapters registered on it, the lifecycle state of
//! those components, and the list of its child containers. Lookups that find
//! nothing locally continue in the parent; the parent never sees its
//! children's registrations.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──make_child_container()──> Container
//!                                  │                                     │
//!                         add_component / add_instance          parent lookups
//!                                  │
//!                                  ▼
//!                   BehaviorPipeline ──> adapter stack ──> AdapterRegistry
//! ```
//!
//! # Examples
//! ```rust
//! use arbor_container::prelude::*;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! struct Host { greeter: std::sync::Arc<dyn Greeter> }
//!
//! let container = Container::new();
//! container
//!     .add_instance("english", Value::new(English).implements::<dyn Greeter>(|e| e))
//!     .unwrap()
//!     .add_component(
//!         ComponentKey::of::<Host>(),
//!         Constructor::new(|args| Ok(Host { greeter: args.get::<dyn Greeter>(0)? }))
//!             .depends_on(Dependency::on::<dyn Greeter>()),
//!     )
//!     .unwrap();
//!
//! let host = container.component::<Host>().unwrap();
//! assert_eq!(host.greeter.greet(), "hello");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use crate::adapter::{
    BoundAdapter, ComponentAdapter, CycleGuard, Injector, InjectorAdapter, InstanceAdapter,
    LateInstance, ResolutionContext, find_adapter,
};
use crate::behaviors::{Behavior, BehaviorPipeline, HiddenImplementation, Proxy};
use crate::error::{ArborError, Result};
use crate::implementation::Component;
use crate::key::{ComponentKey, TypeInfo};
use crate::lifecycle::{LifecycleState, LifecycleStrategy, StartableLifecycleStrategy};
use crate::monitor::{ComponentMonitor, null_monitor};
use crate::properties::{Characteristic, Properties};
use crate::provider::{Provider, ProviderAdapter};
use crate::registry::{AdapterRegistry, same};
use crate::resolver::{self, Resolution};
use crate::visitor::ContainerVisitor;

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

// ═══════════════════════════════════════════
// ContainerBuilder
// ═══════════════════════════════════════════

/// Builds a [`Container`].
///
/// # Examples
/// ```rust
/// use arbor_container::prelude::*;
///
/// let root = Container::builder()
///     .name("root")
///     .behavior(Behavior::Caching)
///     .build();
///
/// let child = Container::builder().name("request").parent(&root).build();
/// assert_eq!(child.to_string(), "request:0<root:0<|");
/// ```
pub struct ContainerBuilder {
    name: Option<String>,
    parent: Option<Container>,
    lifecycle: Arc<dyn LifecycleStrategy>,
    monitor: Arc<dyn ComponentMonitor>,
    behaviors: Vec<Behavior>,
    pipeline: Option<Arc<BehaviorPipeline>>,
    properties: Properties,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            name: None,
            parent: None,
            lifecycle: Arc::new(StartableLifecycleStrategy::new()),
            monitor: null_monitor(),
            behaviors: Vec::new(),
            pipeline: None,
            properties: Properties::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lookups that fail here continue in `parent`.
    ///
    /// The new container is not added to the parent's children; use
    /// [`Container::add_child_container`] for that.
    pub fn parent(mut self, parent: &Container) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Defaults to [`StartableLifecycleStrategy`].
    pub fn lifecycle<L: LifecycleStrategy + 'static>(mut self, strategy: L) -> Self {
        self.lifecycle = Arc::new(strategy);
        self
    }

    pub fn monitor<M: ComponentMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    /// Applies `behavior` to every registration of the container.
    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Default flags merged under every registration's own flags.
    pub fn properties(mut self, properties: impl Into<Properties>) -> Self {
        self.properties.extend(&properties.into());
        self
    }

    fn shared(
        parent: &Container,
        pipeline: Arc<BehaviorPipeline>,
        lifecycle: Arc<dyn LifecycleStrategy>,
        monitor: Arc<dyn ComponentMonitor>,
    ) -> Self {
        Self {
            name: None,
            parent: Some(parent.clone()),
            lifecycle,
            monitor,
            behaviors: Vec::new(),
            pipeline: Some(pipeline),
            properties: Properties::new(),
        }
    }

    pub fn build(self) -> Container {
        let id = NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed);
        let name = self.name.unwrap_or_else(|| format!("container-{id}"));
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| Arc::new(BehaviorPipeline::new(self.behaviors)));

        debug!(
            container = %name,
            parent = ?self.parent.as_ref().map(Container::name),
            behaviors = ?pipeline.behaviors(),
            "Building container"
        );

        Container {
            inner: Arc::new(ContainerInner {
                id,
                name: RwLock::new(name),
                parent: self.parent,
                children: RwLock::new(Vec::new()),
                children_started: Mutex::new(HashSet::new()),
                registry: RwLock::new(AdapterRegistry::new()),
                state: Mutex::new(LifecycleState::default()),
                defaults: RwLock::new(self.properties),
                pipeline,
                lifecycle: self.lifecycle,
                monitor: RwLock::new(self.monitor),
                lock: ReentrantMutex::new(()),
            }),
        }
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct ContainerInner {
    id: u64,
    name: RwLock<String>,
    parent: Option<Container>,
    children: RwLock<Vec<Container>>,
    /// Ids of the children started by the last `start`.
    children_started: Mutex<HashSet<u64>>,
    registry: RwLock<AdapterRegistry>,
    state: Mutex<LifecycleState>,
    defaults: RwLock<Properties>,
    pipeline: Arc<BehaviorPipeline>,
    lifecycle: Arc<dyn LifecycleStrategy>,
    monitor: RwLock<Arc<dyn ComponentMonitor>>,
    /// Serializes start/stop/dispose and bulk reads.
    lock: ReentrantMutex<()>,
}

/// A node of the composition tree.
///
/// `Container` is a cheap handle; clones refer to the same node. A parent
/// keeps its children alive until it is disposed or the child is removed.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// A root container with default settings.
    pub fn new() -> Self {
        ContainerBuilder::new().build()
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    // ── Identity ──

    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let _lock = self.inner.lock.lock();
        *self.inner.name.write() = name.into();
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    pub fn lifecycle_strategy(&self) -> &Arc<dyn LifecycleStrategy> {
        &self.inner.lifecycle
    }

    pub fn pipeline(&self) -> &Arc<BehaviorPipeline> {
        &self.inner.pipeline
    }

    /// Read-only view of the parent.
    pub fn parent(&self) -> Option<ParentView<'_>> {
        self.inner.parent.as_ref().map(ParentView)
    }

    pub(crate) fn parent_container(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    pub fn children(&self) -> Vec<Container> {
        self.inner.children.read().clone()
    }

    // ── Configuration ──

    /// Merges `properties` into the container-level default flags.
    pub fn change(&self, properties: impl Into<Properties>) -> &Self {
        self.inner.defaults.write().extend(&properties.into());
        self
    }

    pub fn defaults(&self) -> Properties {
        self.inner.defaults.read().clone()
    }

    /// Registers the next component with `properties` laid over the
    /// container defaults.
    ///
    /// ```rust
    /// use arbor_container::prelude::*;
    ///
    /// struct Clock;
    ///
    /// let container = Container::new();
    /// container
    ///     .with(Characteristic::CACHE)
    ///     .add_component(ComponentKey::of::<Clock>(), Constructor::new(|_| Ok(Clock)))
    ///     .unwrap();
    ///
    /// let a = container.component::<Clock>().unwrap();
    /// let b = container.component::<Clock>().unwrap();
    /// assert!(std::sync::Arc::ptr_eq(&a, &b));
    /// ```
    pub fn with(&self, properties: impl Into<Properties>) -> Registrar<'_> {
        Registrar {
            container: self,
            properties: properties.into(),
        }
    }

    pub fn change_monitor(&self, monitor: Arc<dyn ComponentMonitor>) -> Arc<dyn ComponentMonitor> {
        let previous = std::mem::replace(&mut *self.inner.monitor.write(), monitor.clone());
        for adapter in self.component_adapters() {
            adapter.change_monitor(monitor.clone());
        }
        for child in self.children() {
            child.change_monitor(monitor.clone());
        }
        previous
    }

    pub fn current_monitor(&self) -> Arc<dyn ComponentMonitor> {
        self.inner.monitor.read().clone()
    }

    // ── Registration ──

    /// Registers a component built by `injector`, wrapped in the behaviors
    /// selected by the container's defaults.
    ///
    /// # Errors
    /// [`ArborError::DuplicateKey`], [`ArborError::NotConcreteType`] or
    /// [`ArborError::UnprocessedConfiguration`]. The container is unchanged
    /// on failure.
    pub fn add_component<J: Injector>(
        &self,
        key: impl Into<ComponentKey>,
        injector: J,
    ) -> Result<&Self> {
        self.with(Properties::new()).add_component(key, injector)
    }

    /// Registers a ready-made instance.
    pub fn add_instance(
        &self,
        key: impl Into<ComponentKey>,
        component: impl Into<Component>,
    ) -> Result<&Self> {
        self.with(Properties::new()).add_instance(key, component)
    }

    /// Registers an adapter built outside the container. Only the reduced
    /// behavior set applies.
    pub fn add_adapter(&self, adapter: Arc<dyn ComponentAdapter>) -> Result<&Self> {
        self.with(Properties::new()).add_adapter(adapter)
    }

    /// Registers a lazy provider, keyed by the provided type.
    pub fn add_provider<T: Send + Sync + 'static>(&self, provider: Provider<T>) -> Result<&Self> {
        self.with(Properties::new()).add_provider(provider)
    }

    fn register_component(
        &self,
        key: ComponentKey,
        injector: Arc<dyn Injector>,
        call: &Properties,
    ) -> Result<&Self> {
        let mut properties = call.over(&self.defaults());
        let use_names = properties.remove_if_present(Characteristic::USE_NAMES);
        let monitor = self.current_monitor();

        let base: Arc<dyn ComponentAdapter> = Arc::new(InjectorAdapter::new(
            key,
            injector,
            self.inner.lifecycle.clone(),
            monitor.clone(),
            use_names,
        )?);
        let adapter = self.inner.pipeline.create(&monitor, &mut properties, base)?;
        properties.ensure_consumed()?;
        self.register(adapter)
    }

    fn register_adapter(
        &self,
        adapter: Arc<dyn ComponentAdapter>,
        call: &Properties,
    ) -> Result<&Self> {
        let mut properties = call.over(&self.defaults());
        properties.remove_if_present(Characteristic::USE_NAMES);

        let adapter = self
            .inner
            .pipeline
            .adapt(&self.current_monitor(), &mut properties, adapter)?;
        properties.ensure_consumed()?;
        self.register(adapter)
    }

    /// Registers `adapter`; while started it is also instantiated and
    /// started, and a failure there undoes the registration.
    fn register(&self, adapter: Arc<dyn ComponentAdapter>) -> Result<&Self> {
        self.inner.registry.write().register(adapter.clone())?;

        if self.state().is_started() {
            let started = self
                .add_if_startable(&adapter)
                .and_then(|()| self.potentially_start(&adapter));
            if let Err(err) = started {
                warn!(key = %adapter.key().short(), %err, "Rolling back registration");
                self.inner.registry.write().remove(adapter.key());
                return Err(err);
            }
        }
        Ok(self)
    }

    /// Unregisters the component under `key`.
    ///
    /// # Errors
    /// [`ArborError::IllegalLifecycleTransition`] while started or after
    /// dispose.
    pub fn remove_component(
        &self,
        key: impl Into<ComponentKey>,
    ) -> Result<Option<Arc<dyn ComponentAdapter>>> {
        let key = key.into();
        self.state().removing_component(&self.name())?;
        Ok(self.inner.registry.write().remove(&key))
    }

    /// Unregisters the component that produces `instance`.
    pub fn remove_component_by_instance<I: ?Sized>(
        &self,
        instance: &Arc<I>,
    ) -> Result<Option<Arc<dyn ComponentAdapter>>> {
        self.state().removing_component(&self.name())?;

        for adapter in self.component_adapters() {
            let guard = CycleGuard::new();
            let produced = adapter.produce(&ResolutionContext::new(self, &guard))?;
            if std::ptr::addr_eq(Arc::as_ptr(&produced), Arc::as_ptr(instance)) {
                return self.remove_component(adapter.key());
            }
        }
        Ok(None)
    }

    // ── Lookup ──

    /// The adapter registered under `key` here or up the parent chain, or a
    /// late instance supplied by the monitor.
    ///
    /// Parent-owned adapters come back bound to their owner.
    pub fn component_adapter(&self, key: &ComponentKey) -> Option<Arc<dyn ComponentAdapter>> {
        let local = self.inner.registry.read().get(key);
        if local.is_some() {
            return local;
        }

        if let Some(parent) = self.parent_container() {
            if let Some(found) = parent.component_adapter(key) {
                return Some(resolver::bind(found, parent));
            }
        }

        let component = self.current_monitor().no_component_found(self, key)?;
        trace!(key = %key.short(), "Monitor supplied a late instance");
        Some(Arc::new(LateInstance::new(key.clone(), component)))
    }

    /// Local adapters in registration order.
    pub fn component_adapters(&self) -> Vec<Arc<dyn ComponentAdapter>> {
        self.inner.registry.read().all()
    }

    /// Local adapters that can satisfy a request for `ty`.
    pub fn component_adapters_of_type(&self, ty: &TypeInfo) -> Vec<Arc<dyn ComponentAdapter>> {
        resolver::adapters_of_type(self, ty)
    }

    /// The component registered under (or resolvable as) `key`.
    ///
    /// `Ok(None)` when nothing matches; ambiguity and production failures
    /// are errors.
    pub fn get_component(&self, key: impl Into<ComponentKey>) -> Result<Option<Component>> {
        self.fetch(&key.into(), None).map(|(_, component)| component)
    }

    /// Like [`get_component`](Self::get_component), produced for injection
    /// into `into`.
    pub fn get_component_into(
        &self,
        key: impl Into<ComponentKey>,
        into: TypeInfo,
    ) -> Result<Option<Component>> {
        self.fetch(&key.into(), Some(into))
            .map(|(_, component)| component)
    }

    /// The single component that can be viewed as `I`.
    pub fn component<I: ?Sized + 'static>(&self) -> Result<Arc<I>> {
        self.component_by_key::<I>(ComponentKey::of::<I>())
    }

    /// The component under `key`, viewed as `I`.
    pub fn component_by_key<I: ?Sized + 'static>(
        &self,
        key: impl Into<ComponentKey>,
    ) -> Result<Arc<I>> {
        let key = key.into();
        let (resolution, component) = self.fetch(&key, None)?;
        let component = component.ok_or_else(|| resolution.unsatisfied())?;

        component.cast::<I>().ok_or_else(|| ArborError::NotAssignable {
            key,
            requested: TypeInfo::of::<I>(),
        })
    }

    /// Every local component viewable as `I`, in first-instantiation order.
    pub fn components<I: ?Sized + 'static>(&self) -> Result<Vec<Arc<I>>> {
        let _lock = self.inner.lock.lock();
        let ty = TypeInfo::of::<I>();
        let guard = CycleGuard::new();
        let ctx = ResolutionContext::new(self, &guard);

        let mut produced = Vec::new();
        for adapter in self.component_adapters() {
            if adapter.implementation().is_assignable_to(&ty) {
                let component = self.instance_of(&adapter, &ctx)?;
                produced.push((adapter, component));
            }
        }

        let ordered = self.inner.registry.read().ordered();
        let position = |adapter: &Arc<dyn ComponentAdapter>| {
            ordered
                .iter()
                .position(|o| same(o, adapter))
                .unwrap_or(usize::MAX)
        };
        produced.sort_by_key(|(adapter, _)| position(adapter));

        Ok(produced
            .into_iter()
            .filter_map(|(_, component)| component.cast::<I>())
            .collect())
    }

    /// Call-level handle on a hidden component.
    ///
    /// # Errors
    /// [`ArborError::Composition`] when the component was not registered
    /// with implementation hiding.
    pub fn proxy<I: ?Sized + 'static>(&self, key: impl Into<ComponentKey>) -> Result<Proxy<I>> {
        let key = key.into();
        let adapter = self
            .component_adapter(&key)
            .ok_or_else(|| ArborError::unsatisfied(&key))?;

        let interceptors = find_adapter::<HiddenImplementation>(adapter.as_ref())
            .ok_or_else(|| {
                ArborError::Composition(format!(
                    "{key} does not hide its implementation, so it cannot be proxied"
                ))
            })?
            .interceptors()
            .cloned();

        if !adapter.implementation().is_assignable_to(&TypeInfo::of::<I>()) {
            return Err(ArborError::NotAssignable {
                key,
                requested: TypeInfo::of::<I>(),
            });
        }
        Ok(Proxy::new(self.clone(), adapter, interceptors))
    }

    /// Resolves `key` here and produces it in `ctx`. Used by guards.
    pub(crate) fn lookup(
        &self,
        key: &ComponentKey,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Component>> {
        let resolution = resolver::resolve_key(self, key)?;
        if !resolution.is_resolved() {
            return Ok(None);
        }
        resolution.resolve_instance(&ctx.with_container(self)).map(Some)
    }

    fn fetch(
        &self,
        key: &ComponentKey,
        into: Option<TypeInfo>,
    ) -> Result<(Resolution, Option<Component>)> {
        trace!(container = %self.name(), key = %key.short(), "Looking up component");
        let guard = CycleGuard::new();
        let ctx = ResolutionContext::new(self, &guard);
        let ctx = match into {
            Some(target) => ctx.with_target(target),
            None => ctx,
        };

        let resolution = resolver::resolve_key(self, key)?;
        let Some(adapter) = resolution.adapter().cloned() else {
            return Ok((resolution, None));
        };

        let component = resolution.resolve_instance(&ctx)?;
        self.decorate(&adapter)?;
        Ok((resolution, Some(component)))
    }

    /// Produces an adapter matched by the resolver in the container that
    /// owns it.
    pub(crate) fn produce_resolved(
        &self,
        adapter: &Arc<dyn ComponentAdapter>,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Component> {
        if adapter.as_any().is::<LateInstance>() || self.owns(adapter) {
            return self.instance_of(adapter, ctx);
        }

        if let Some(bound) = adapter.as_any().downcast_ref::<BoundAdapter>() {
            let owner = bound.container();
            return owner.produce_resolved(bound.inner(), &ctx.with_container(owner));
        }

        match self.parent_container() {
            Some(parent) => parent.produce_resolved(adapter, &ctx.with_container(parent)),
            None => Err(ArborError::unsatisfied(adapter.key())),
        }
    }

    fn owns(&self, adapter: &Arc<dyn ComponentAdapter>) -> bool {
        self.inner.registry.read().contains(adapter)
    }

    fn instance_of(
        &self,
        adapter: &Arc<dyn ComponentAdapter>,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Component> {
        match adapter.produce(&ctx.with_container(self)) {
            Ok(instance) => {
                if !adapter.as_any().is::<LateInstance>() {
                    self.inner.registry.write().add_ordered(adapter.clone());
                }
                Ok(Component::new(instance, adapter.implementation().clone()))
            }
            Err(err) if err.is_cyclic() => {
                let Some(parent) = self.parent_container() else {
                    return Err(err);
                };
                debug!(
                    container = %self.name(),
                    key = %adapter.key().short(),
                    "Retrying cyclic resolution in parent"
                );
                match parent.lookup(adapter.key(), &ctx.with_container(parent)) {
                    Ok(Some(component)) => Ok(component),
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    fn decorate(&self, adapter: &Arc<dyn ComponentAdapter>) -> Result<()> {
        if self.inner.lifecycle.called_after_construction(adapter.as_ref())
            && adapter.has_lifecycle()
            && !adapter.is_started()
        {
            adapter.start(self)?;
        }
        Ok(())
    }

    /// Keys registered here and in every ancestor.
    pub(crate) fn visible_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .registry
            .read()
            .keys()
            .map(ToString::to_string)
            .collect();
        if let Some(parent) = self.parent_container() {
            keys.extend(parent.visible_keys());
        }
        keys
    }

    // ── Children ──

    /// A new child sharing this container's pipeline, lifecycle strategy and
    /// monitor. Started right away when this container is started.
    pub fn make_child_container(&self) -> Container {
        let child = ContainerBuilder::shared(
            self,
            self.inner.pipeline.clone(),
            self.inner.lifecycle.clone(),
            self.current_monitor(),
        )
        .build();

        debug!(parent = %self.name(), child = %child.name(), "Made child container");
        self.inner.children.write().push(child.clone());

        if self.state().is_started() {
            self.inner.children_started.lock().insert(child.id());
            if let Err(err) = child.start() {
                warn!(child = %child.name(), %err, "Failed to start child container");
            }
        }
        child
    }

    /// Tracks `child` as a child of this container, starting it when this
    /// container is already started. A child that fails to start is not
    /// tracked.
    ///
    /// # Errors
    /// [`ArborError::Composition`] when `child` is this container or one of
    /// its ancestors.
    pub fn add_child_container(&self, child: Container) -> Result<&Self> {
        if child == *self || self.ancestors().any(|ancestor| *ancestor == child) {
            return Err(ArborError::Composition(format!(
                "Cannot add {child} as a child of {self}: it would close a cycle in the container tree"
            )));
        }

        debug!(parent = %self.name(), child = %child.name(), "Added child container");
        self.inner.children.write().push(child.clone());

        if self.state().is_started() && !child.state().is_started() {
            self.inner.children_started.lock().insert(child.id());
            if let Err(err) = child.start() {
                self.remove_child_container(&child);
                return Err(err);
            }
        }
        Ok(self)
    }

    /// Stops tracking `child`. Returns whether it was a child.
    pub fn remove_child_container(&self, child: &Container) -> bool {
        let removed = {
            let mut children = self.inner.children.write();
            let before = children.len();
            children.retain(|c| c != child);
            children.len() != before
        };
        self.inner.children_started.lock().remove(&child.id());

        if removed {
            debug!(parent = %self.name(), child = %child.name(), "Removed child container");
        }
        removed
    }

    fn ancestors(&self) -> impl Iterator<Item = &Container> + '_ {
        std::iter::successors(self.parent_container(), |c| c.parent_container())
    }

    // ── Lifecycle ──

    /// Instantiates every component with a lifecycle, starts them in
    /// first-instantiation order, then starts the children.
    ///
    /// # Errors
    /// [`ArborError::IllegalLifecycleTransition`] unless constructed or
    /// stopped; otherwise the first component failure.
    #[instrument(skip(self), fields(container = %self.name()))]
    pub fn start(&self) -> Result<()> {
        let _lock = self.inner.lock.lock();
        {
            let mut state = self.inner.state.lock();
            state.starting(&self.name())?;
            state.started();
        }
        info!(components = self.inner.registry.read().len(), "Starting container");

        for adapter in self.component_adapters() {
            self.add_if_startable(&adapter)?;
        }
        let ordered = self.inner.registry.read().ordered();
        for adapter in &ordered {
            self.potentially_start(adapter)?;
        }

        let children = self.children();
        {
            let mut started = self.inner.children_started.lock();
            started.clear();
            started.extend(children.iter().map(Container::id));
        }
        for child in &children {
            child.start()?;
        }
        Ok(())
    }

    /// Stops started children, then this container's components in reverse
    /// instantiation order.
    ///
    /// Keeps going after a failure; the state always ends up stopped and the
    /// first failure is returned.
    #[instrument(skip(self), fields(container = %self.name()))]
    pub fn stop(&self) -> Result<()> {
        let _lock = self.inner.lock.lock();
        self.state().stopping(&self.name())?;
        info!("Stopping container");

        let mut first: Option<ArborError> = None;
        for child in self.children() {
            let was_started = self.inner.children_started.lock().contains(&child.id());
            if was_started && child.state().is_started() {
                if let Err(err) = child.stop() {
                    warn!(child = %child.name(), %err, "Failed to stop child container");
                    first.get_or_insert(err);
                }
            }
        }

        let ordered = self.inner.registry.read().ordered();
        for adapter in ordered.iter().rev() {
            if adapter.has_lifecycle() && adapter.is_started() {
                if let Err(err) = adapter.stop(self) {
                    warn!(key = %adapter.key().short(), %err, "Failed to stop component");
                    first.get_or_insert(err);
                }
            }
        }

        self.inner.state.lock().stopped();
        first.map_or(Ok(()), Err)
    }

    /// Stops if started, then disposes children and components in reverse
    /// instantiation order. Terminal.
    ///
    /// # Errors
    /// [`ArborError::IllegalLifecycleTransition`] when already disposed;
    /// otherwise the first failure, after every phase has run.
    #[instrument(skip(self), fields(container = %self.name()))]
    pub fn dispose(&self) -> Result<()> {
        let _lock = self.inner.lock.lock();
        let mut first: Option<ArborError> = None;

        if self.state().is_started() {
            if let Err(err) = self.stop() {
                first.get_or_insert(err);
            }
        }
        self.state().disposing(&self.name())?;
        info!("Disposing container");

        for child in self.children() {
            if child.state().is_disposed() {
                continue;
            }
            if let Err(err) = child.dispose() {
                warn!(child = %child.name(), %err, "Failed to dispose child container");
                first.get_or_insert(err);
            }
        }

        let ordered = self.inner.registry.read().ordered();
        for adapter in ordered.iter().rev() {
            if let Err(err) = adapter.dispose(self) {
                warn!(key = %adapter.key().short(), %err, "Failed to dispose component");
                first.get_or_insert(err);
            }
        }

        self.inner.state.lock().disposed();
        self.inner.children.write().clear();
        self.inner.children_started.lock().clear();

        let shares_pipeline = self
            .parent_container()
            .is_some_and(|parent| Arc::ptr_eq(&parent.inner.pipeline, &self.inner.pipeline));
        if !shares_pipeline {
            self.inner.pipeline.dispose();
        }

        first.map_or(Ok(()), Err)
    }

    fn add_if_startable(&self, adapter: &Arc<dyn ComponentAdapter>) -> Result<()> {
        if adapter.has_lifecycle() && self.inner.lifecycle.called_after_context_start(adapter.as_ref())
        {
            let guard = CycleGuard::new();
            self.instance_of(adapter, &ResolutionContext::new(self, &guard))?;
        }
        Ok(())
    }

    fn potentially_start(&self, adapter: &Arc<dyn ComponentAdapter>) -> Result<()> {
        if self.inner.lifecycle.called_after_context_start(adapter.as_ref()) && !adapter.is_started() {
            adapter.start(self)?;
        }
        Ok(())
    }

    // ── Inspection ──

    /// Checks that every local component's dependencies resolve, then does
    /// the same for the children. Nothing is instantiated.
    ///
    /// Every failure is logged; the first one is returned.
    #[instrument(skip(self), fields(container = %self.name()))]
    pub fn verify(&self) -> Result<()> {
        let mut first: Option<ArborError> = None;

        for adapter in self.component_adapters() {
            let guard = CycleGuard::new();
            if let Err(err) = adapter.verify(&ResolutionContext::new(self, &guard)) {
                warn!(key = %adapter.key().short(), %err, "Verification failed");
                first.get_or_insert(err);
            }
        }
        for child in self.children() {
            if let Err(err) = child.verify() {
                first.get_or_insert(err);
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// Walks this container, its pipeline, every layer of every adapter,
    /// then the children.
    pub fn accept(&self, visitor: &mut dyn ContainerVisitor) {
        if !visitor.visit_container(self) {
            return;
        }
        visitor.visit_behavior_pipeline(&self.inner.pipeline);

        for adapter in self.component_adapters() {
            let mut layer = Some(adapter.as_ref());
            while let Some(current) = layer {
                visitor.visit_adapter(current);
                layer = current.delegate();
            }
        }
        for child in self.children() {
            child.accept(visitor);
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.inner.registry.read().len();
        write!(f, "{}:{count}<", self.name())?;
        match self.parent_container() {
            Some(parent) => write!(f, "{parent}"),
            None => f.write_str("|"),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("registered", &self.inner.registry.read().len())
            .field("children", &self.inner.children.read().len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// ParentView
// ═══════════════════════════════════════════

/// What a child may do with its parent: look things up, nothing else.
#[derive(Clone, Copy)]
pub struct ParentView<'a>(&'a Container);

impl<'a> ParentView<'a> {
    pub fn name(&self) -> String {
        self.0.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state()
    }

    pub fn parent(&self) -> Option<ParentView<'a>> {
        self.0.parent()
    }

    pub fn component<I: ?Sized + 'static>(&self) -> Result<Arc<I>> {
        self.0.component::<I>()
    }

    pub fn component_by_key<I: ?Sized + 'static>(
        &self,
        key: impl Into<ComponentKey>,
    ) -> Result<Arc<I>> {
        self.0.component_by_key::<I>(key)
    }

    pub fn get_component(&self, key: impl Into<ComponentKey>) -> Result<Option<Component>> {
        self.0.get_component(key)
    }

    pub fn component_adapter(&self, key: &ComponentKey) -> Option<Arc<dyn ComponentAdapter>> {
        self.0.component_adapter(key)
    }

    pub fn component_adapters(&self) -> Vec<Arc<dyn ComponentAdapter>> {
        self.0.component_adapters()
    }
}

impl fmt::Display for ParentView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)
    }
}

impl fmt::Debug for ParentView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParentView").field(&self.0.name()).finish()
    }
}

// ═══════════════════════════════════════════
// Registrar
// ═══════════════════════════════════════════

/// One registration with its own flags. Created by [`Container::with`].
pub struct Registrar<'a> {
    container: &'a Container,
    properties: Properties,
}

impl<'a> Registrar<'a> {
    pub fn add_component<J: Injector>(
        self,
        key: impl Into<ComponentKey>,
        injector: J,
    ) -> Result<&'a Container> {
        self.container
            .register_component(key.into(), Arc::new(injector), &self.properties)
    }

    pub fn add_instance(
        self,
        key: impl Into<ComponentKey>,
        component: impl Into<Component>,
    ) -> Result<&'a Container> {
        let adapter = Arc::new(InstanceAdapter::new(
            key.into(),
            component.into(),
            self.container.inner.lifecycle.clone(),
            self.container.current_monitor(),
        ));
        self.container.register_adapter(adapter, &self.properties)
    }

    pub fn add_adapter(self, adapter: Arc<dyn ComponentAdapter>) -> Result<&'a Container> {
        self.container.register_adapter(adapter, &self.properties)
    }

    pub fn add_provider<T: Send + Sync + 'static>(
        self,
        provider: Provider<T>,
    ) -> Result<&'a Container> {
        let adapter = Arc::new(ProviderAdapter::new(
            provider,
            self.container.inner.lifecycle.clone(),
        ));
        self.container.register_adapter(adapter, &self.properties)
    }
}

impl fmt::Debug for Registrar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("container", &self.container.name())
            .field("properties", &self.properties)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, ParentView, Registrar};
    pub use crate::adapter::{ComponentAdapter, Constructor, Dependency, Injector};
    pub use crate::behaviors::{Behavior, Interceptors, Proxy, Store};
    pub use crate::error::{ArborError, Result};
    pub use crate::implementation::{BoxError, Component, Value};
    pub use crate::key::{ComponentKey, TypeInfo};
    pub use crate::lifecycle::{Disposable, LifecycleState, Startable};
    pub use crate::monitor::{ComponentMonitor, TracingComponentMonitor};
    pub use crate::properties::{Characteristic, Properties};
    pub use crate::provider::Provider;
    pub use crate::visitor::ContainerVisitor;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::any::TypeId;

    use super::*;
    use crate::adapter::{Constructor, Dependency};
    use crate::behaviors::{Interceptors, InvocationController, Precondition};
    use crate::implementation::{BoxError, Value};
    use crate::lifecycle::{Disposable, Startable};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Service {
        name: &'static str,
        log: Log,
    }

    impl Service {
        fn record(&self, event: &str) {
            self.log.lock().push(format!("{event} {}", self.name));
        }
    }

    impl Startable for Service {
        fn start(&self) -> std::result::Result<(), BoxError> {
            self.record("start");
            Ok(())
        }

        fn stop(&self) -> std::result::Result<(), BoxError> {
            self.record("stop");
            Ok(())
        }
    }

    impl Disposable for Service {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.record("dispose");
            Ok(())
        }
    }

    /// A startable service depending on the services under `on`.
    fn service(name: &'static str, on: &[&'static str], log: &Log) -> Constructor<Service> {
        let log = log.clone();
        let mut constructor = Constructor::new(move |args| {
            for index in 0..args.len() {
                args.get::<Service>(index)?;
            }
            Ok(Service {
                name,
                log: log.clone(),
            })
        })
        .implements::<dyn Startable>(|s| s)
        .implements::<dyn Disposable>(|s| s);

        for dependency in on {
            constructor = constructor.depends_on(Dependency::on::<Service>().keyed(*dependency));
        }
        constructor
    }

    struct Broken;

    impl Startable for Broken {
        fn start(&self) -> std::result::Result<(), BoxError> {
            Err("no power".into())
        }

        fn stop(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    fn broken() -> Constructor<Broken> {
        Constructor::new(|_| Ok(Broken)).implements::<dyn Startable>(|b| b)
    }

    fn caching() -> Container {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("arbor_container=trace")
            .with_test_writer()
            .try_init();
        Container::builder().behavior(Behavior::Caching).build()
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[test]
    fn duplicate_key_keeps_first_registration() {
        let container = Container::new();
        container.add_instance("answer", Component::of(42u32)).unwrap();

        match container.add_instance("answer", Component::of(7u32)) {
            Err(ArborError::DuplicateKey(err)) => assert_eq!(err.key, ComponentKey::from("answer")),
            other => panic!("Expected DuplicateKey, got: {other:?}"),
        }
        assert_eq!(*container.component_by_key::<u32>("answer").unwrap(), 42);
    }

    #[test]
    fn unprocessed_flags_reject_the_registration() {
        let container = Container::new();
        let mut typo = Properties::new();
        typo.set("chache", "true");

        let result = container
            .with(typo)
            .add_component("clock", Constructor::new(|_| Ok(1u64)));
        assert!(matches!(result, Err(ArborError::UnprocessedConfiguration(_))));
        assert!(container.component_adapters().is_empty());
    }

    #[test]
    fn missing_component_reports_suggestions() {
        let container = Container::new();
        container.add_instance("database-url", Component::of("x")).unwrap();

        match container.component_by_key::<&str>("database") {
            Err(ArborError::UnsatisfiedDependency(err)) => {
                assert_eq!(err.suggestions, vec!["\"database-url\"".to_string()]);
            }
            other => panic!("Expected UnsatisfiedDependency, got: {other:?}"),
        }
        assert!(container.get_component("nothing").unwrap().is_none());
    }

    #[test]
    fn wrong_view_is_not_assignable() {
        let container = Container::new();
        container.add_instance("answer", Component::of(42u32)).unwrap();

        assert!(matches!(
            container.component_by_key::<String>("answer"),
            Err(ArborError::NotAssignable { .. })
        ));
    }

    #[test]
    fn lookups_delegate_up_but_not_down() {
        let parent = Container::new();
        parent.add_instance("shared", Component::of(1u8)).unwrap();
        let child = parent.make_child_container();
        child.add_instance("local", Component::of(2u16)).unwrap();

        assert_eq!(*child.component_by_key::<u8>("shared").unwrap(), 1);
        assert_eq!(*child.component::<u8>().unwrap(), 1);
        assert!(parent.get_component("local").unwrap().is_none());
        assert!(parent.component::<u16>().is_err());
    }

    #[test]
    fn parent_components_are_built_in_the_parent() {
        let log = Log::default();
        let parent = caching();
        parent.add_component("a", service("a", &[], &log)).unwrap();
        let child = parent.make_child_container();
        child.add_component("b", service("b", &["a"], &log)).unwrap();

        child.component_by_key::<Service>("b").unwrap();
        assert_eq!(parent.inner.registry.read().ordered().len(), 1);
        assert_eq!(child.inner.registry.read().ordered().len(), 1);
    }

    #[test]
    fn cycles_fail_without_a_parent() {
        let log = Log::default();
        let container = Container::new();
        container
            .add_component("a", service("a", &["b"], &log))
            .unwrap()
            .add_component("b", service("b", &["a"], &log))
            .unwrap();

        match container.component_by_key::<Service>("a") {
            Err(ArborError::CyclicDependency(err)) => assert!(err.chain.len() >= 2),
            other => panic!("Expected CyclicDependency, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cycles_are_broken_by_the_parent_scope() {
        let log = Log::default();
        let parent = Container::new();
        parent.add_component("a", service("outer-a", &[], &log)).unwrap();

        let child = parent.make_child_container();
        child
            .add_component("a", service("a", &["b"], &log))
            .unwrap()
            .add_component("b", service("b", &["a"], &log))
            .unwrap();

        let a = child.component_by_key::<Service>("a").unwrap();
        assert_eq!(a.name, "a");
    }

    #[test]
    fn lifecycle_runs_in_dependency_order_and_reverses() {
        let log = Log::default();
        let container = caching();
        container
            .add_component("b", service("b", &["a"], &log))
            .unwrap()
            .add_component("a", service("a", &[], &log))
            .unwrap();

        container.start().unwrap();
        container.stop().unwrap();
        container.dispose().unwrap();

        assert_eq!(
            events(&log),
            vec!["start a", "start b", "stop b", "stop a", "dispose b", "dispose a"]
        );
        assert!(container.state().is_disposed());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let container = Container::new();
        assert!(matches!(
            container.stop(),
            Err(ArborError::IllegalLifecycleTransition(_))
        ));

        container.start().unwrap();
        assert!(matches!(
            container.start(),
            Err(ArborError::IllegalLifecycleTransition(_))
        ));
        assert!(matches!(
            container.remove_component("anything"),
            Err(ArborError::IllegalLifecycleTransition(_))
        ));
    }

    #[test]
    fn second_dispose_fails_without_disposing_again() {
        let log = Log::default();
        let container = caching();
        container.add_component("a", service("a", &[], &log)).unwrap();

        container.component_by_key::<Service>("a").unwrap();
        container.dispose().unwrap();
        assert!(matches!(
            container.dispose(),
            Err(ArborError::IllegalLifecycleTransition(_))
        ));
        assert_eq!(events(&log), vec!["dispose a"]);
    }

    #[test]
    fn stop_continues_past_failures() {
        struct Faulty;
        impl Startable for Faulty {
            fn start(&self) -> std::result::Result<(), BoxError> {
                Ok(())
            }
            fn stop(&self) -> std::result::Result<(), BoxError> {
                Err("stuck".into())
            }
        }

        let log = Log::default();
        let container = caching();
        container
            .add_component("a", service("a", &[], &log))
            .unwrap()
            .add_component(
                "faulty",
                Constructor::new(|_| Ok(Faulty)).implements::<dyn Startable>(|f| f),
            )
            .unwrap();

        container.start().unwrap();
        match container.stop() {
            Err(ArborError::LifecycleFailed { phase, .. }) => assert_eq!(phase, "stop"),
            other => panic!("Expected LifecycleFailed, got: {other:?}"),
        }
        assert!(events(&log).contains(&"stop a".to_string()));
        assert!(container.state().is_stopped());
    }

    #[test]
    fn registering_while_started_starts_the_component() {
        let log = Log::default();
        let container = caching();
        container.start().unwrap();

        container.add_component("late", service("late", &[], &log)).unwrap();
        assert_eq!(events(&log), vec!["start late"]);
    }

    #[test]
    fn children_follow_the_parent_lifecycle() {
        let log = Log::default();
        let parent = caching();
        let child = parent.make_child_container();
        child.add_component("c", service("c", &[], &log)).unwrap();

        parent.start().unwrap();
        assert!(child.state().is_started());
        parent.dispose().unwrap();

        assert!(child.state().is_disposed());
        assert!(parent.children().is_empty());
        assert_eq!(events(&log), vec!["start c", "stop c", "dispose c"]);
    }

    #[test]
    fn removal_by_key_and_by_instance() {
        let container = Container::new();
        container
            .add_instance("one", Component::of(1u32))
            .unwrap()
            .add_instance("two", Component::of(2u64))
            .unwrap();

        assert!(container.remove_component("one").unwrap().is_some());
        assert!(container.get_component("one").unwrap().is_none());

        let two = container.component::<u64>().unwrap();
        let removed = container.remove_component_by_instance(&two).unwrap().unwrap();
        assert_eq!(removed.key(), &ComponentKey::from("two"));
        assert!(container.component_adapters().is_empty());
    }

    #[test]
    fn components_follow_instantiation_order() {
        let container = Container::new();
        container
            .add_instance("first", Component::of(1u32))
            .unwrap()
            .add_instance("second", Component::of(2u32))
            .unwrap();

        container.component_by_key::<u32>("second").unwrap();
        let all: Vec<u32> = container
            .components::<u32>()
            .unwrap()
            .into_iter()
            .map(|n| *n)
            .collect();
        assert_eq!(all, vec![2, 1]);
    }

    #[test]
    fn container_defaults_apply_until_overridden() {
        let container = Container::new();
        container.change(Characteristic::CACHE);
        container
            .add_component("cached", Constructor::new(|_| Ok(String::from("x"))))
            .unwrap();
        container
            .with(Characteristic::NO_CACHE)
            .add_component("fresh", Constructor::new(|_| Ok(1u8)))
            .unwrap();

        let a = container.component_by_key::<String>("cached").unwrap();
        let b = container.component_by_key::<String>("cached").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let x = container.component_by_key::<u8>("fresh").unwrap();
        let y = container.component_by_key::<u8>("fresh").unwrap();
        assert!(!Arc::ptr_eq(&x, &y));
    }

    #[test]
    fn monitor_supplies_late_instances() {
        struct Fallback;
        impl ComponentMonitor for Fallback {
            fn no_component_found(&self, _: &Container, key: &ComponentKey) -> Option<Component> {
                (key.name() == Some("late")).then(|| Component::of(5u32))
            }
        }

        let container = Container::builder().monitor(Fallback).build();
        assert_eq!(*container.component_by_key::<u32>("late").unwrap(), 5);
        assert!(container.inner.registry.read().ordered().is_empty());
        assert!(container.get_component("other").unwrap().is_none());
    }

    #[test]
    fn hidden_components_are_reached_through_proxies() {
        trait Clock: Send + Sync {
            fn now(&self) -> u64;
        }
        struct Fixed(u64);
        impl Clock for Fixed {
            fn now(&self) -> u64 {
                self.0
            }
        }

        let container = Container::new();
        container
            .with(Characteristic::HIDE_IMPL)
            .add_instance("clock", Value::new(Fixed(42)).implements::<dyn Clock>(|c| c))
            .unwrap()
            .add_instance("plain", Component::of(0u8))
            .unwrap();

        assert!(matches!(
            container.component_by_key::<Fixed>("clock"),
            Err(ArborError::NotAssignable { .. })
        ));
        let proxy = container.proxy::<dyn Clock>("clock").unwrap();
        assert_eq!(proxy.invoke(|clock| clock.now()).unwrap(), 42);
        assert!(matches!(
            container.proxy::<u8>("plain"),
            Err(ArborError::Composition(_))
        ));
    }

    #[test]
    fn verify_reports_missing_dependencies() {
        let log = Log::default();
        let container = Container::new();
        container.add_component("a", service("a", &["missing"], &log)).unwrap();

        assert!(matches!(
            container.verify(),
            Err(ArborError::UnsatisfiedDependency(_))
        ));
        assert!(events(&log).is_empty());

        container.add_component("missing", service("m", &[], &log)).unwrap();
        container.verify().unwrap();
    }

    #[test]
    fn child_wiring_rejects_cycles() {
        let root = Container::new();
        let child = root.make_child_container();

        assert!(matches!(
            child.add_child_container(root.clone()),
            Err(ArborError::Composition(_))
        ));
        assert!(matches!(
            root.add_child_container(root.clone()),
            Err(ArborError::Composition(_))
        ));
        assert!(root.remove_child_container(&child));
        assert!(!root.remove_child_container(&child));
    }

    #[test]
    fn display_walks_the_parent_chain() {
        let root = Container::builder().name("root").build();
        root.add_instance("n", Component::of(1u8)).unwrap();
        let child = root.make_child_container();
        child.set_name("kid");

        assert_eq!(root.to_string(), "root:1<|");
        assert_eq!(child.to_string(), "kid:0<root:1<|");
        assert_eq!(child.parent().unwrap().name(), "root");
    }

    #[test]
    fn change_monitor_reaches_adapters() {
        let container = Container::new();
        container
            .add_component("n", Constructor::new(|_| Ok(1u8)))
            .unwrap();

        let previous = container.change_monitor(Arc::new(crate::monitor::TracingComponentMonitor));
        assert!(Arc::ptr_eq(&previous, &null_monitor()));

        let adapter = container.component_adapter(&ComponentKey::from("n")).unwrap();
        let current = adapter.current_monitor().unwrap();
        assert!(Arc::ptr_eq(&current, &container.current_monitor()));
    }

    #[test]
    fn failed_start_undoes_late_registration() {
        let container = caching();
        container.start().unwrap();

        assert!(container.add_component("broken", broken()).is_err());
        assert!(container.component_adapter(&ComponentKey::from("broken")).is_none());
        assert!(container.inner.registry.read().ordered().is_empty());

        container.add_instance("broken", Component::of(1u8)).unwrap();
    }

    #[test]
    fn children_that_fail_to_start_are_dropped() {
        let parent = caching();
        parent.start().unwrap();

        let child = caching();
        child.add_component("broken", broken()).unwrap();

        assert!(parent.add_child_container(child.clone()).is_err());
        assert!(parent.children().is_empty());
        assert!(!parent.inner.children_started.lock().contains(&child.id()));
    }

    struct Licence(bool);

    impl Precondition for Licence {
        fn check(&self) -> std::result::Result<(), BoxError> {
            if self.0 { Ok(()) } else { Err("expired".into()) }
        }
    }

    fn guarded_report(container: &Container) {
        container
            .with(Properties::new().guarded_by("licence"))
            .add_component("report", Constructor::new(|_| Ok(7u32)))
            .unwrap();
    }

    #[test]
    fn failing_guard_aborts_production() {
        let container = Container::new();
        container
            .add_instance(
                "licence",
                Value::new(Licence(false)).implements::<dyn Precondition>(|l| l),
            )
            .unwrap();
        guarded_report(&container);

        match container.component_by_key::<u32>("report") {
            Err(ArborError::GuardRejected { key, guard, source }) => {
                assert_eq!(key, ComponentKey::from("report"));
                assert_eq!(guard, ComponentKey::from("licence"));
                assert_eq!(source.to_string(), "expired");
            }
            other => panic!("Expected GuardRejected, got: {other:?}"),
        }
    }

    #[test]
    fn passing_guard_lets_production_through() {
        let container = Container::new();
        container
            .add_instance(
                "licence",
                Value::new(Licence(true)).implements::<dyn Precondition>(|l| l),
            )
            .unwrap();
        guarded_report(&container);

        assert_eq!(*container.component_by_key::<u32>("report").unwrap(), 7);
    }

    #[test]
    fn missing_guard_is_unsatisfied() {
        let container = Container::new();
        guarded_report(&container);

        match container.component_by_key::<u32>("report") {
            Err(ArborError::UnsatisfiedDependency(err)) => {
                assert!(err.requested.contains("licence"));
            }
            other => panic!("Expected UnsatisfiedDependency, got: {other:?}"),
        }
    }

    struct Widget;

    fn counted_widget(hits: &Arc<AtomicU64>) -> Constructor<Widget> {
        let hits = hits.clone();
        Constructor::new(|_| Ok(Widget)).static_member(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn static_members_initialize_once_per_type() {
        let hits = Arc::new(AtomicU64::new(0));
        let container = Container::new();
        container
            .add_component("first", counted_widget(&hits))
            .unwrap()
            .add_component("second", counted_widget(&hits))
            .unwrap();
        let child = container.make_child_container();
        child.add_component("third", counted_widget(&hits)).unwrap();

        container.component_by_key::<Widget>("first").unwrap();
        container.component_by_key::<Widget>("second").unwrap();
        container.component_by_key::<Widget>("first").unwrap();
        child.component_by_key::<Widget>("third").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(container.inner.pipeline.statics().contains(TypeId::of::<Widget>()));
    }

    #[test]
    fn failed_static_members_are_retried() {
        let attempts = Arc::new(AtomicU64::new(0));
        let seen = attempts.clone();
        let container = Container::new();
        container
            .add_component(
                "widget",
                Constructor::new(|_| Ok(Widget)).static_member(move |_| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(ArborError::Composition("settings not loaded".into()));
                    }
                    Ok(())
                }),
            )
            .unwrap();

        assert!(container.component_by_key::<Widget>("widget").is_err());
        container.component_by_key::<Widget>("widget").unwrap();
        container.component_by_key::<Widget>("widget").unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    trait Meter: Send + Sync {
        fn read(&self) -> u32;
    }

    struct Gauge;

    impl Meter for Gauge {
        fn read(&self) -> u32 {
            1
        }
    }

    struct Veto(InvocationController);

    impl Meter for Veto {
        fn read(&self) -> u32 {
            self.0.veto();
            99
        }
    }

    #[test]
    fn intercepting_container_runs_hooks_around_proxies() {
        let interceptors = Arc::new(Interceptors::new());
        let container = Container::builder()
            .behavior(Behavior::Intercepting(interceptors.clone()))
            .build();
        container
            .add_component(
                "meter",
                Constructor::new(|_| Ok(Gauge)).implements::<dyn Meter>(|g| g),
            )
            .unwrap();

        assert!(matches!(
            container.component_by_key::<Gauge>("meter"),
            Err(ArborError::NotAssignable { .. })
        ));
        let proxy = container.proxy::<dyn Meter>("meter").unwrap();
        assert_eq!(proxy.invoke(|meter| meter.read()).unwrap(), 1);

        interceptors.add_pre::<dyn Meter>(Arc::new(Veto(interceptors.controller())));
        assert_eq!(proxy.invoke(|meter| meter.read()).unwrap(), 99);
        assert!(interceptors.controller().is_vetoed());
        assert!(interceptors.controller().instance().is_some());
    }

    #[test]
    fn automatic_components_start_only_when_memoized() {
        let log = Log::default();
        let container = Container::new();
        container
            .with(Characteristic::AUTOMATIC)
            .add_component("plain", service("plain", &[], &log))
            .unwrap()
            .with(Properties::from([Characteristic::AUTOMATIC, Characteristic::CACHE]))
            .add_component("cached", service("cached", &[], &log))
            .unwrap();

        container.start().unwrap();
        assert_eq!(events(&log), vec!["start cached"]);
    }
}

//! Injector-backed base adapters.
//!
//! An [`Injector`] knows how to build one component type. The container wraps
//! it in an [`InjectorAdapter`], which is the innermost layer of every
//! component registered through `add_component`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::trace;

use super::{ComponentAdapter, ResolutionContext, next_adapter_id};
use crate::error::{ArborError, Result};
use crate::implementation::{BoxError, Component, Implementation, Instance};
use crate::key::{ComponentKey, Qualifier, TypeInfo};
use crate::lifecycle::LifecycleStrategy;
use crate::monitor::ComponentMonitor;
use crate::resolver::{ComponentParameter, Request};

/// What the injector is producing for.
pub struct InjectionSite<'a> {
    pub key: &'a ComponentKey,
    /// Prefer dependencies registered under their declared names
    pub use_names: bool,
}

/// Strategy that builds instances of one implementation type.
pub trait Injector: Send + Sync + 'static {
    fn implementation(&self) -> &Implementation;

    fn inject(&self, site: &InjectionSite<'_>, ctx: &ResolutionContext<'_>) -> Result<Instance>;

    fn verify(&self, _site: &InjectionSite<'_>, _ctx: &ResolutionContext<'_>) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

/// Base adapter around an [`Injector`].
pub struct InjectorAdapter {
    id: u64,
    key: ComponentKey,
    injector: Arc<dyn Injector>,
    lifecycle: Arc<dyn LifecycleStrategy>,
    monitor: RwLock<Arc<dyn ComponentMonitor>>,
    use_names: bool,
}

impl InjectorAdapter {
    /// Fails with [`ArborError::NotConcreteType`] for abstract implementations.
    pub fn new(
        key: ComponentKey,
        injector: Arc<dyn Injector>,
        lifecycle: Arc<dyn LifecycleStrategy>,
        monitor: Arc<dyn ComponentMonitor>,
        use_names: bool,
    ) -> Result<Self> {
        let implementation = injector.implementation();
        if !implementation.is_concrete() {
            return Err(ArborError::NotConcreteType(implementation.info()));
        }

        Ok(Self {
            id: next_adapter_id(),
            key,
            injector,
            lifecycle,
            monitor: RwLock::new(monitor),
            use_names,
        })
    }

    pub fn injector(&self) -> &Arc<dyn Injector> {
        &self.injector
    }

    fn site(&self) -> InjectionSite<'_> {
        InjectionSite {
            key: &self.key,
            use_names: self.use_names,
        }
    }

    fn lifecycle_failed(&self, phase: &'static str, source: BoxError) -> ArborError {
        let err = ArborError::LifecycleFailed {
            key: self.key.clone(),
            phase,
            source,
        };
        self.monitor
            .read()
            .lifecycle_invocation_failed(&self.key, phase, &err);
        err
    }
}

impl ComponentAdapter for InjectorAdapter {
    fn key(&self) -> &ComponentKey {
        &self.key
    }

    fn implementation(&self) -> &Implementation {
        self.injector.implementation()
    }

    fn produce(&self, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let _entry = ctx.guard().enter(self.id, self.implementation().info())?;
        let monitor = self.monitor.read().clone();

        monitor.instantiating(&self.key);
        let started = Instant::now();

        match self.injector.inject(&self.site(), ctx) {
            Ok(instance) => {
                trace!(key = %self.key.short(), "Produced instance");
                monitor.instantiated(&self.key, self.implementation(), started.elapsed());
                Ok(instance)
            }
            Err(err) => {
                monitor.instantiation_failed(&self.key, &err);
                Err(err)
            }
        }
    }

    fn verify(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        let _entry = ctx.guard().enter(self.id, self.implementation().info())?;
        self.injector.verify(&self.site(), ctx)
    }

    fn descriptor(&self) -> String {
        self.injector.describe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .start(instance, self.implementation())
            .map_err(|source| self.lifecycle_failed("start", source))
    }

    fn stop_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .stop(instance, self.implementation())
            .map_err(|source| self.lifecycle_failed("stop", source))
    }

    fn dispose_component(&self, instance: &Instance) -> Result<()> {
        self.lifecycle
            .dispose(instance, self.implementation())
            .map_err(|source| self.lifecycle_failed("dispose", source))
    }

    fn type_has_lifecycle(&self) -> bool {
        self.lifecycle.has_lifecycle(self.implementation())
    }

    fn change_monitor(&self, monitor: Arc<dyn ComponentMonitor>) -> Arc<dyn ComponentMonitor> {
        std::mem::replace(&mut *self.monitor.write(), monitor)
    }

    fn current_monitor(&self) -> Result<Arc<dyn ComponentMonitor>> {
        Ok(self.monitor.read().clone())
    }
}

impl fmt::Debug for InjectorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorAdapter")
            .field("key", &self.key)
            .field("injector", &self.injector.describe())
            .finish()
    }
}

/// One declared constructor dependency.
///
/// ```
/// use arbor_container::adapter::Dependency;
///
/// trait Mailer: Send + Sync {}
///
/// let dependency = Dependency::on::<dyn Mailer>().named("smtp");
/// assert_eq!(dependency.name(), Some("smtp"));
/// ```
#[derive(Debug, Clone)]
pub struct Dependency {
    ty: TypeInfo,
    name: Option<String>,
    key: Option<ComponentKey>,
    qualifier: Option<Qualifier>,
}

impl Dependency {
    /// Depends on whatever component can be viewed as `I`.
    pub fn on<I: ?Sized + 'static>() -> Self {
        Self {
            ty: TypeInfo::of::<I>(),
            name: None,
            key: None,
            qualifier: None,
        }
    }

    /// Declared parameter name, used to break ties when names are enabled.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Resolve strictly by this key, skipping type matching.
    pub fn keyed(mut self, key: impl Into<ComponentKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn qualified(mut self, qualifier: &'static str) -> Self {
        self.qualifier = Some(Qualifier(qualifier));
        self
    }

    pub fn type_info(&self) -> TypeInfo {
        self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn request<'a>(&'a self, site: &InjectionSite<'a>) -> Request<'a> {
        Request {
            requester: Some(site.key),
            ty: self.ty,
            name: self.name.as_deref(),
            use_names: site.use_names,
            qualifier: self.qualifier,
        }
    }

    fn parameter(&self) -> ComponentParameter {
        ComponentParameter::new(self.key.clone())
    }
}

/// Resolved dependencies handed to a constructor, in declaration order.
pub struct Arguments<'a> {
    key: &'a ComponentKey,
    values: Vec<Component>,
}

impl Arguments<'_> {
    /// The dependency at `index`, viewed as `I`.
    pub fn get<I: ?Sized + 'static>(&self, index: usize) -> Result<Arc<I>> {
        let component = self.values.get(index).ok_or_else(|| {
            ArborError::Composition(format!(
                "{} asked for argument {index} but declares only {}",
                self.key,
                self.values.len()
            ))
        })?;

        component.cast::<I>().ok_or_else(|| ArborError::NotAssignable {
            key: self.key.clone(),
            requested: TypeInfo::of::<I>(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type Build<T> = dyn Fn(&Arguments<'_>) -> std::result::Result<T, BoxError> + Send + Sync;

/// Constructor injection: resolve the declared dependencies, then call `build`.
///
/// ```
/// use std::sync::Arc;
/// use arbor_container::adapter::{Constructor, Dependency};
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let injector = Constructor::new(|args| {
///     let config = args.get::<Config>(0)?;
///     Ok(Database { url: config.url.clone() })
/// })
/// .depends_on(Dependency::on::<Config>());
/// ```
pub struct Constructor<T> {
    implementation: Implementation,
    dependencies: Vec<Dependency>,
    build: Arc<Build<T>>,
}

impl<T: Send + Sync + 'static> Constructor<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&Arguments<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            implementation: Implementation::of::<T>(),
            dependencies: Vec::new(),
            build: Arc::new(build),
        }
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Declares that the built component can be viewed as `I`.
    pub fn implements<I: ?Sized + 'static>(mut self, upcast: fn(Arc<T>) -> Arc<I>) -> Self {
        self.implementation = self.implementation.implements::<T, I>(upcast);
        self
    }

    /// Declares a string-valued property the property-applying behavior can set.
    pub fn setter<F>(mut self, name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&T, &str) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.implementation = self.implementation.setter::<T, F>(name, apply);
        self
    }

    /// Declares a static member initialized once before the first instance.
    pub fn static_member<F>(mut self, init: F) -> Self
    where
        F: Fn(&ResolutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.implementation = self.implementation.static_member(init);
        self
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl<T: Send + Sync + 'static> Injector for Constructor<T> {
    fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    fn inject(&self, site: &InjectionSite<'_>, ctx: &ResolutionContext<'_>) -> Result<Instance> {
        let target = ctx.with_target(self.implementation.info());
        let mut values = Vec::with_capacity(self.dependencies.len());

        for dependency in &self.dependencies {
            let resolution = dependency
                .parameter()
                .resolve(ctx.container(), &dependency.request(site))?;
            values.push(resolution.resolve_instance(&target)?);
        }

        let arguments = Arguments {
            key: site.key,
            values,
        };
        let value = (self.build)(&arguments)
            .map_err(|err| ArborError::from_factory(site.key, err))?;
        Ok(Arc::new(value))
    }

    fn verify(&self, site: &InjectionSite<'_>, ctx: &ResolutionContext<'_>) -> Result<()> {
        for dependency in &self.dependencies {
            dependency
                .parameter()
                .verify(ctx, &dependency.request(site))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Constructor<{}>", self.implementation.info().short_name())
    }
}

//! Implementation metadata.
//!
//! The container never inspects types at runtime. Everything the resolver and
//! the behaviors need to know about a component's concrete type is recorded
//! here when the component is registered: which capability views (trait
//! objects) it can be seen through, which named properties it accepts, and
//! which static members must be initialized before first use.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::ResolutionContext;
use crate::error::Result;
use crate::key::TypeInfo;

/// A produced component, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Error type user factories and lifecycle hooks return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Caster = Arc<dyn Fn(&Instance) -> Option<Box<dyn Any>> + Send + Sync>;
type Setter = Arc<dyn Fn(&Instance, &str) -> std::result::Result<(), BoxError> + Send + Sync>;
type StaticMember = Arc<dyn Fn(&ResolutionContext<'_>) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct Capability {
    info: TypeInfo,
    caster: Caster,
}

#[derive(Clone)]
struct ImplementationInner {
    info: TypeInfo,
    concrete: bool,
    capabilities: Vec<Capability>,
    setters: BTreeMap<String, Setter>,
    statics: Vec<StaticMember>,
}

/// Declared shape of a component's concrete type.
///
/// Cheap to clone.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use arbor_container::implementation::{Implementation, Instance};
/// use arbor_container::key::TypeInfo;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let implementation = Implementation::of::<English>()
///     .implements::<English, dyn Greeter>(|e| e);
///
/// assert!(implementation.is_assignable_to(&TypeInfo::of::<dyn Greeter>()));
///
/// let instance: Instance = Arc::new(English);
/// let greeter = implementation.cast::<dyn Greeter>(&instance).unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
#[derive(Clone)]
pub struct Implementation {
    inner: Arc<ImplementationInner>,
}

impl Implementation {
    /// Metadata for the concrete type `T`, viewable as itself.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        let caster: Caster = Arc::new(|instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(typed) as Box<dyn Any>)
        });

        Self {
            inner: Arc::new(ImplementationInner {
                info: TypeInfo::of::<T>(),
                concrete: true,
                capabilities: vec![Capability {
                    info: TypeInfo::of::<T>(),
                    caster,
                }],
                setters: BTreeMap::new(),
                statics: Vec::new(),
            }),
        }
    }

    /// Metadata for a type that cannot be constructed directly.
    pub fn abstract_of<T: ?Sized + 'static>() -> Self {
        Self {
            inner: Arc::new(ImplementationInner {
                info: TypeInfo::of::<T>(),
                concrete: false,
                capabilities: Vec::new(),
                setters: BTreeMap::new(),
                statics: Vec::new(),
            }),
        }
    }

    /// Declares that instances of `T` can be viewed as `I`.
    pub fn implements<T, I>(mut self, upcast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + 'static,
    {
        let caster: Caster = Arc::new(move |instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(upcast(typed)) as Box<dyn Any>)
        });

        let inner = Arc::make_mut(&mut self.inner);
        inner.capabilities.retain(|c| c.info != TypeInfo::of::<I>());
        inner.capabilities.push(Capability {
            info: TypeInfo::of::<I>(),
            caster,
        });
        self
    }

    /// Declares a string-valued property setter.
    pub fn setter<T, F>(mut self, name: impl Into<String>, apply: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &str) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let setter: Setter = Arc::new(move |instance: &Instance, value: &str| {
            match instance.downcast_ref::<T>() {
                Some(typed) => apply(typed, value),
                None => Err(format!("instance is not a {}", std::any::type_name::<T>()).into()),
            }
        });
        Arc::make_mut(&mut self.inner)
            .setters
            .insert(name.into(), setter);
        self
    }

    /// Declares a static member initialized once per type before first use.
    pub fn static_member<F>(mut self, init: F) -> Self
    where
        F: Fn(&ResolutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner).statics.push(Arc::new(init));
        self
    }

    /// Copy of this metadata that no longer exposes the concrete type.
    ///
    /// Only the declared capability views remain reachable.
    pub fn hidden(&self) -> Self {
        let mut inner = (*self.inner).clone();
        let info = inner.info;
        inner.capabilities.retain(|c| c.info != info);
        Self {
            inner: Arc::new(inner),
        }
    }

    #[inline]
    pub fn info(&self) -> TypeInfo {
        self.inner.info
    }

    #[inline]
    pub fn is_concrete(&self) -> bool {
        self.inner.concrete
    }

    /// Whether a request for `ty` can be served by this implementation.
    pub fn is_assignable_to(&self, ty: &TypeInfo) -> bool {
        self.inner.capabilities.iter().any(|c| c.info == *ty)
    }

    /// Capability views, concrete type first when visible.
    pub fn capabilities(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.inner.capabilities.iter().map(|c| c.info)
    }

    /// Views `instance` as `I`, if this implementation declares it.
    pub fn cast<I: ?Sized + 'static>(&self, instance: &Instance) -> Option<Arc<I>> {
        let wanted = TypeInfo::of::<I>();
        let capability = self.inner.capabilities.iter().find(|c| c.info == wanted)?;
        let boxed = (capability.caster)(instance)?;
        boxed.downcast::<Arc<I>>().ok().map(|typed| *typed)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.setters.keys().map(String::as_str)
    }

    /// Applies one property value. `None` when no such setter exists.
    pub fn apply_property(
        &self,
        instance: &Instance,
        name: &str,
        value: &str,
    ) -> Option<std::result::Result<(), BoxError>> {
        self.inner
            .setters
            .get(name)
            .map(|setter| setter(instance, value))
    }

    pub fn has_statics(&self) -> bool {
        !self.inner.statics.is_empty()
    }

    pub(crate) fn inject_statics(&self, ctx: &ResolutionContext<'_>) -> Result<()> {
        for init in &self.inner.statics {
            init(ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("type", &self.inner.info.type_name())
            .field("concrete", &self.inner.concrete)
            .field(
                "capabilities",
                &self.capabilities().map(|c| c.short_name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A produced instance together with the metadata needed to view it.
#[derive(Clone)]
pub struct Component {
    pub instance: Instance,
    pub implementation: Implementation,
}

impl Component {
    pub fn new(instance: Instance, implementation: Implementation) -> Self {
        Self {
            instance,
            implementation,
        }
    }

    /// Wraps a plain value viewable only as itself.
    pub fn of<T: Send + Sync + 'static>(value: T) -> Self {
        Value::new(value).into()
    }

    pub fn cast<I: ?Sized + 'static>(&self) -> Option<Arc<I>> {
        self.implementation.cast::<I>(&self.instance)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("implementation", &self.implementation.info().type_name())
            .finish()
    }
}

/// Typed builder for a pre-built component value.
///
/// ```
/// use arbor_container::implementation::{Component, Value};
///
/// trait Named: Send + Sync {
///     fn name(&self) -> &str;
/// }
/// struct Service;
/// impl Named for Service {
///     fn name(&self) -> &str { "service" }
/// }
///
/// let component: Component = Value::new(Service)
///     .implements::<dyn Named>(|s| s)
///     .into();
/// assert_eq!(component.cast::<dyn Named>().unwrap().name(), "service");
/// ```
pub struct Value<T> {
    value: Arc<T>,
    implementation: Implementation,
}

impl<T: Send + Sync + 'static> Value<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
            implementation: Implementation::of::<T>(),
        }
    }

    pub fn implements<I: ?Sized + 'static>(mut self, upcast: fn(Arc<T>) -> Arc<I>) -> Self {
        self.implementation = self.implementation.implements::<T, I>(upcast);
        self
    }
}

impl<T: Send + Sync + 'static> From<Value<T>> for Component {
    fn from(value: Value<T>) -> Self {
        let instance: Instance = value.value;
        Component::new(instance, value.implementation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    trait Shape: Send + Sync {
        fn area(&self) -> u32;
    }

    struct Square {
        side: Mutex<u32>,
    }

    impl Shape for Square {
        fn area(&self) -> u32 {
            let side = *self.side.lock().unwrap();
            side * side
        }
    }

    fn square_impl() -> Implementation {
        Implementation::of::<Square>()
            .implements::<Square, dyn Shape>(|s| s)
            .setter::<Square, _>("side", |square, value| {
                *square.side.lock().unwrap() = value.parse()?;
                Ok(())
            })
    }

    #[test]
    fn concrete_and_capability_views() {
        let implementation = square_impl();
        let instance: Instance = Arc::new(Square {
            side: Mutex::new(3),
        });

        assert!(implementation.is_assignable_to(&TypeInfo::of::<Square>()));
        assert!(implementation.is_assignable_to(&TypeInfo::of::<dyn Shape>()));
        assert!(!implementation.is_assignable_to(&TypeInfo::of::<String>()));

        assert_eq!(implementation.cast::<dyn Shape>(&instance).unwrap().area(), 9);
        assert!(implementation.cast::<String>(&instance).is_none());
    }

    #[test]
    fn hidden_drops_concrete_view() {
        let hidden = square_impl().hidden();
        let instance: Instance = Arc::new(Square {
            side: Mutex::new(2),
        });

        assert!(!hidden.is_assignable_to(&TypeInfo::of::<Square>()));
        assert!(hidden.cast::<Square>(&instance).is_none());
        assert_eq!(hidden.cast::<dyn Shape>(&instance).unwrap().area(), 4);
    }

    #[test]
    fn setters_apply_by_name() {
        let implementation = square_impl();
        let instance: Instance = Arc::new(Square {
            side: Mutex::new(1),
        });

        implementation
            .apply_property(&instance, "side", "5")
            .unwrap()
            .unwrap();
        assert_eq!(implementation.cast::<dyn Shape>(&instance).unwrap().area(), 25);

        assert!(implementation.apply_property(&instance, "colour", "red").is_none());
        assert!(
            implementation
                .apply_property(&instance, "side", "not a number")
                .unwrap()
                .is_err()
        );
    }

    #[test]
    fn abstract_types_are_not_concrete() {
        let implementation = Implementation::abstract_of::<dyn Shape>();
        assert!(!implementation.is_concrete());
        assert_eq!(implementation.capabilities().count(), 0);
    }
}

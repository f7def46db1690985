//! Matching a requested dependency to exactly one adapter.
//!
//! Resolution order for a request by type:
//!
//! 1. an adapter registered under the type itself as key (here or up the
//!    parent chain), unless it is the requester;
//! 2. otherwise every local adapter whose implementation can be viewed as the
//!    type, or whose provider produces it, minus the requester and minus
//!    candidates carrying a different qualifier;
//! 3. none: ask the parent; one: done; several: prefer the candidate
//!    registered under the dependency's declared name (when names are in
//!    use), else fail as ambiguous.
//!
//! Matching happens eagerly; producing the instance is deferred to
//! [`Resolution::resolve_instance`].

use std::sync::Arc;

use arbor_support::rendering::suggest_similar;
use tracing::{trace, warn};

use crate::adapter::{BoundAdapter, ComponentAdapter, ResolutionContext, find_adapter};
use crate::container::Container;
use crate::error::{AmbiguousResolutionError, ArborError, Result, UnsatisfiedDependencyError};
use crate::implementation::Component;
use crate::key::{ComponentKey, Qualifier, TypeInfo};
use crate::provider::ProviderAdapter;

/// What is being asked for, and by whom.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// The adapter whose construction needs the dependency
    pub requester: Option<&'a ComponentKey>,
    pub ty: TypeInfo,
    /// Declared parameter name
    pub name: Option<&'a str>,
    pub use_names: bool,
    pub qualifier: Option<Qualifier>,
}

impl Request<'_> {
    /// A bare request for `ty`: no requester, no name, no qualifier.
    pub fn for_type(ty: TypeInfo) -> Self {
        Self {
            requester: None,
            ty,
            name: None,
            use_names: false,
            qualifier: None,
        }
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    fn exact_key(&self) -> ComponentKey {
        match self.qualifier {
            Some(qualifier) => ComponentKey::Qualified(self.ty, qualifier),
            None => ComponentKey::Type(self.ty),
        }
    }

    fn is_requester(&self, adapter: &dyn ComponentAdapter) -> bool {
        self.requester.is_some_and(|key| key == adapter.key())
    }
}

/// A dependency declared against the container: by explicit key, or by
/// type when no key is given.
#[derive(Debug, Clone, Default)]
pub struct ComponentParameter {
    key: Option<ComponentKey>,
}

impl ComponentParameter {
    pub fn new(key: Option<ComponentKey>) -> Self {
        Self { key }
    }

    /// Picks the adapter that satisfies `request` in `container`.
    ///
    /// Finding nothing is not an error here; it is reported when the
    /// instance is asked for.
    pub fn resolve(&self, container: &Container, request: &Request<'_>) -> Result<Resolution> {
        let adapter = match &self.key {
            Some(key) => container.component_adapter(key),
            None => adapter_for_type(container, request)?,
        };
        let adapter = adapter.filter(|adapter| is_compatible(adapter.as_ref(), &request.ty));

        let requested = match &self.key {
            Some(key) => key.to_string(),
            None => request.ty.type_name().to_string(),
        };
        Ok(Resolution::new(
            container,
            adapter,
            Some(request.ty),
            requested,
            request.requester.cloned(),
        ))
    }

    /// Same search as [`resolve`](Self::resolve), then verifies the chosen
    /// adapter. Nothing is instantiated.
    pub fn verify(&self, ctx: &ResolutionContext<'_>, request: &Request<'_>) -> Result<()> {
        let resolution = self.resolve(ctx.container(), request)?;
        match resolution.adapter() {
            Some(adapter) => adapter.verify(ctx),
            None => Err(resolution.unsatisfied()),
        }
    }
}

/// Outcome of matching: which adapter, if any, and how to get its instance.
pub struct Resolution {
    adapter: Option<Arc<dyn ComponentAdapter>>,
    ty: Option<TypeInfo>,
    requested: String,
    required_by: Option<ComponentKey>,
    suggestions: Vec<String>,
}

impl Resolution {
    fn new(
        container: &Container,
        adapter: Option<Arc<dyn ComponentAdapter>>,
        ty: Option<TypeInfo>,
        requested: String,
        required_by: Option<ComponentKey>,
    ) -> Self {
        trace!(requested = %requested, resolved = adapter.is_some(), "Resolved dependency");
        let suggestions = match adapter {
            Some(_) => Vec::new(),
            None => suggestions(container, &requested),
        };
        Self {
            adapter,
            ty,
            requested,
            required_by,
            suggestions,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn adapter(&self) -> Option<&Arc<dyn ComponentAdapter>> {
        self.adapter.as_ref()
    }

    /// Produces the matched component in `ctx`.
    ///
    /// A request for `Provider<T>` matched by a provider adapter gets the
    /// provider itself rather than a produced `T`.
    pub fn resolve_instance(&self, ctx: &ResolutionContext<'_>) -> Result<Component> {
        let adapter = self.adapter.as_ref().ok_or_else(|| self.unsatisfied())?;

        if let Some(provider) = find_adapter::<ProviderAdapter>(adapter.as_ref()) {
            if let Some(ty) = self.ty.filter(|ty| *ty == provider.provider_type()) {
                if !adapter.implementation().is_assignable_to(&ty) {
                    return Ok(provider.provider().clone());
                }
            }
        }

        ctx.container().produce_resolved(adapter, ctx)
    }

    pub fn unsatisfied(&self) -> ArborError {
        ArborError::UnsatisfiedDependency(UnsatisfiedDependencyError {
            requested: self.requested.clone(),
            required_by: self.required_by.clone(),
            suggestions: self.suggestions.clone(),
        })
    }
}

/// Resolves a lookup key the way a top-level `get_component` does: names by
/// key, types and qualified types through type matching.
pub fn resolve_key(container: &Container, key: &ComponentKey) -> Result<Resolution> {
    match key {
        ComponentKey::Name(_) => Ok(Resolution::new(
            container,
            container.component_adapter(key),
            None,
            key.to_string(),
            None,
        )),
        ComponentKey::Type(ty) => {
            ComponentParameter::default().resolve(container, &Request::for_type(*ty))
        }
        ComponentKey::Qualified(ty, qualifier) => ComponentParameter::default()
            .resolve(container, &Request::for_type(*ty).qualified(*qualifier)),
    }
}

/// The adapter that satisfies a request by type, searching up the parent
/// chain. Parent-owned adapters come back bound to their owner.
pub fn adapter_for_type(
    container: &Container,
    request: &Request<'_>,
) -> Result<Option<Arc<dyn ComponentAdapter>>> {
    if let Some(by_key) = container.component_adapter(&request.exact_key()) {
        if !request.is_requester(by_key.as_ref()) {
            return Ok(Some(by_key));
        }
    }

    let candidates: Vec<Arc<dyn ComponentAdapter>> = adapters_of_type(container, &request.ty)
        .into_iter()
        .filter(|adapter| !request.is_requester(adapter.as_ref()))
        .filter(|adapter| match (request.qualifier, adapter.key().qualifier()) {
            (Some(wanted), Some(carried)) => wanted == carried,
            _ => true,
        })
        .collect();

    match candidates.len() {
        0 => match container.parent_container() {
            Some(parent) => {
                let outer = Request {
                    requester: None,
                    ..*request
                };
                Ok(adapter_for_type(parent, &outer)?.map(|found| bind(found, parent)))
            }
            None => Ok(None),
        },
        1 => Ok(candidates.into_iter().next()),
        _ => {
            if request.use_names {
                if let Some(named) = request.name.and_then(|name| named_adapter(container, name)) {
                    if is_compatible(named.as_ref(), &request.ty) && !request.is_requester(named.as_ref()) {
                        return Ok(Some(named));
                    }
                }
            }

            let candidates: Vec<TypeInfo> = candidates
                .iter()
                .map(|adapter| adapter.implementation().info())
                .collect();
            warn!(
                requested = %request.ty.short_name(),
                candidates = candidates.len(),
                "Ambiguous resolution"
            );
            Err(ArborError::AmbiguousResolution(AmbiguousResolutionError {
                requested: request.ty,
                candidates,
            }))
        }
    }
}

/// Local adapters that can satisfy a request for `ty`, in registration order.
pub fn adapters_of_type(container: &Container, ty: &TypeInfo) -> Vec<Arc<dyn ComponentAdapter>> {
    container
        .component_adapters()
        .into_iter()
        .filter(|adapter| is_compatible(adapter.as_ref(), ty))
        .collect()
}

/// The adapter registered under `name` here or in the nearest ancestor.
fn named_adapter(container: &Container, name: &str) -> Option<Arc<dyn ComponentAdapter>> {
    let key = ComponentKey::named(name);
    let local = |owner: &Container| {
        owner
            .component_adapters()
            .into_iter()
            .find(|adapter| adapter.key() == &key)
    };

    if let Some(found) = local(container) {
        return Some(found);
    }
    std::iter::successors(container.parent_container(), |c| c.parent_container())
        .find_map(|owner| local(owner).map(|found| bind(found, owner)))
}

fn is_compatible(adapter: &dyn ComponentAdapter, ty: &TypeInfo) -> bool {
    adapter.implementation().is_assignable_to(ty)
        || find_adapter::<ProviderAdapter>(adapter).is_some_and(|p| p.provider_type() == *ty)
}

pub(crate) fn bind(adapter: Arc<dyn ComponentAdapter>, owner: &Container) -> Arc<dyn ComponentAdapter> {
    if adapter.as_any().is::<BoundAdapter>() {
        adapter
    } else {
        Arc::new(BoundAdapter::new(adapter, owner.clone()))
    }
}

fn suggestions(container: &Container, requested: &str) -> Vec<String> {
    let keys = container.visible_keys();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    suggest_similar(requested, &keys, 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Constructor, Dependency};
    use crate::implementation::Value;
    use crate::provider::Provider;

    trait Store: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Disk;
    impl Store for Disk {
        fn name(&self) -> &str {
            "disk"
        }
    }

    struct Memory;
    impl Store for Memory {
        fn name(&self) -> &str {
            "memory"
        }
    }

    fn request(ty: TypeInfo) -> Request<'static> {
        Request::for_type(ty)
    }

    #[test]
    fn exact_type_key_wins_over_assignable_search() {
        let container = Container::new();
        container
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap()
            .add_instance(
                ComponentKey::of::<dyn Store>(),
                Value::new(Memory).implements::<dyn Store>(|m| m),
            )
            .unwrap();

        let found = adapter_for_type(&container, &request(TypeInfo::of::<dyn Store>()))
            .unwrap()
            .unwrap();
        assert_eq!(found.key(), &ComponentKey::of::<dyn Store>());
    }

    #[test]
    fn two_candidates_are_ambiguous() {
        let container = Container::new();
        container
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap()
            .add_instance("memory", Value::new(Memory).implements::<dyn Store>(|m| m))
            .unwrap();

        match adapter_for_type(&container, &request(TypeInfo::of::<dyn Store>())) {
            Err(ArborError::AmbiguousResolution(err)) => {
                assert_eq!(
                    err.candidates,
                    vec![TypeInfo::of::<Disk>(), TypeInfo::of::<Memory>()]
                );
            }
            Err(other) => panic!("Expected AmbiguousResolution, got: {other:?}"),
            Ok(_) => panic!("Expected AmbiguousResolution"),
        }
    }

    #[test]
    fn names_break_ties_when_enabled() {
        let container = Container::new();
        container
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap()
            .add_instance("memory", Value::new(Memory).implements::<dyn Store>(|m| m))
            .unwrap();

        let named = Request {
            name: Some("memory"),
            use_names: true,
            ..request(TypeInfo::of::<dyn Store>())
        };
        let found = adapter_for_type(&container, &named).unwrap().unwrap();
        assert_eq!(found.key(), &ComponentKey::from("memory"));

        let unnamed = Request {
            use_names: false,
            ..named
        };
        assert!(adapter_for_type(&container, &unnamed).is_err());
    }

    #[test]
    fn name_preference_reaches_parent_components() {
        let parent = Container::new();
        parent
            .add_instance("preferred", Value::new(Memory).implements::<dyn Store>(|m| m))
            .unwrap();
        let child = parent.make_child_container();
        child
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap()
            .add_instance("backup", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap();

        let named = Request {
            name: Some("preferred"),
            use_names: true,
            ..request(TypeInfo::of::<dyn Store>())
        };
        let found = adapter_for_type(&child, &named).unwrap().unwrap();
        assert_eq!(found.key(), &ComponentKey::from("preferred"));
        assert!(found.as_any().is::<BoundAdapter>());

        let elsewhere = Request {
            name: Some("missing"),
            ..named
        };
        assert!(matches!(
            adapter_for_type(&child, &elsewhere),
            Err(ArborError::AmbiguousResolution(_))
        ));
    }

    #[test]
    fn qualifiers_filter_candidates() {
        let container = Container::new();
        container
            .add_instance(
                ComponentKey::qualified::<Disk>("primary"),
                Value::new(Disk).implements::<dyn Store>(|d| d),
            )
            .unwrap()
            .add_instance(
                ComponentKey::qualified::<Memory>("cache"),
                Value::new(Memory).implements::<dyn Store>(|m| m),
            )
            .unwrap();

        let cache = request(TypeInfo::of::<dyn Store>()).qualified(Qualifier("cache"));
        let found = adapter_for_type(&container, &cache).unwrap().unwrap();
        assert_eq!(found.implementation().info(), TypeInfo::of::<Memory>());
    }

    #[test]
    fn requester_never_matches_itself() {
        let container = Container::new();
        container
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap();

        let key = ComponentKey::from("disk");
        let from_disk = Request {
            requester: Some(&key),
            ..request(TypeInfo::of::<dyn Store>())
        };
        assert!(adapter_for_type(&container, &from_disk).unwrap().is_none());
    }

    #[test]
    fn parent_adapters_come_back_bound() {
        let parent = Container::new();
        parent
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap();
        let child = parent.make_child_container();

        let found = adapter_for_type(&child, &request(TypeInfo::of::<dyn Store>()))
            .unwrap()
            .unwrap();
        let bound = found.as_any().downcast_ref::<BoundAdapter>().unwrap();
        assert_eq!(bound.container().name(), parent.name());
    }

    #[test]
    fn providers_match_both_types() {
        let container = Container::new();
        container
            .add_provider(Provider::new(|| Ok(Disk)).implements::<dyn Store>(|d| d))
            .unwrap();

        assert!(
            adapter_for_type(&container, &request(TypeInfo::of::<dyn Store>()))
                .unwrap()
                .is_some()
        );
        assert!(
            adapter_for_type(&container, &request(TypeInfo::of::<Provider<Disk>>()))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn unsatisfied_carries_suggestions() {
        let container = Container::new();
        container.add_instance("memory-store", Component::of(1u8)).unwrap();

        let resolution = resolve_key(&container, &ComponentKey::from("memory")).unwrap();
        assert!(!resolution.is_resolved());
        match resolution.unsatisfied() {
            ArborError::UnsatisfiedDependency(err) => {
                assert_eq!(err.suggestions, vec!["\"memory-store\"".to_string()]);
            }
            other => panic!("Expected UnsatisfiedDependency, got: {other:?}"),
        }
    }

    #[test]
    fn explicit_keys_skip_type_matching() {
        let container = Container::new();
        container
            .add_instance("disk", Value::new(Disk).implements::<dyn Store>(|d| d))
            .unwrap()
            .add_instance("memory", Value::new(Memory).implements::<dyn Store>(|m| m))
            .unwrap();

        let dependency = Dependency::on::<dyn Store>().keyed("memory");
        let injector = Constructor::new(|args| Ok(args.get::<dyn Store>(0)?.name().to_string()))
            .depends_on(dependency);
        container.add_component(ComponentKey::of::<String>(), injector).unwrap();

        assert_eq!(*container.component::<String>().unwrap(), "memory");
    }
}

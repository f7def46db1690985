//! Pre- and post-invocation hooks for hidden components.
//!
//! A hook is another implementation of the same capability. Before the real
//! call the proxy makes the same call on the pre hook; after it, on the post
//! hook. Hooks steer the outcome through the [`InvocationController`]:
//! a vetoed pre hook's result replaces the real call, an overriding post
//! hook's result replaces the real result.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use arbor_container::behaviors::{InvocationController, Interceptors};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct Shout(InvocationController);
//!
//! impl Greeter for Shout {
//!     fn greet(&self) -> String {
//!         let original: String = self.0.original_return_value().unwrap_or_default();
//!         self.0.override_result();
//!         original.to_uppercase()
//!     }
//! }
//!
//! let interceptors = Interceptors::new();
//! interceptors.add_post::<dyn Greeter>(Arc::new(Shout(interceptors.controller())));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::thread_table::ThreadTable;
use crate::implementation::Instance;

type Hooks = RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

/// Hook tables keyed by capability.
#[derive(Default)]
pub struct Interceptors {
    pre: Hooks,
    post: Hooks,
    controller: InvocationController,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before every call made through capability `I`.
    pub fn add_pre<I: ?Sized + Send + Sync + 'static>(&self, hook: Arc<I>) {
        self.pre.write().insert(TypeId::of::<I>(), Box::new(hook));
    }

    /// Runs after every call made through capability `I`.
    pub fn add_post<I: ?Sized + Send + Sync + 'static>(&self, hook: Arc<I>) {
        self.post.write().insert(TypeId::of::<I>(), Box::new(hook));
    }

    /// Handle hooks use to veto or override.
    pub fn controller(&self) -> InvocationController {
        self.controller.clone()
    }

    pub(crate) fn intercept<I, R>(&self, instance: &Instance, target: &I, call: &dyn Fn(&I) -> R) -> R
    where
        I: ?Sized + 'static,
        R: Clone + Send + Sync + 'static,
    {
        self.controller.clear();
        self.controller.set_instance(instance.clone());

        if let Some(pre) = Self::hook::<I>(&self.pre) {
            let vetoed_result = call(&pre);
            if self.controller.is_vetoed() {
                trace!(capability = std::any::type_name::<I>(), "Call vetoed by pre hook");
                return vetoed_result;
            }
        }

        let result = call(target);
        self.controller.set_original(Arc::new(result.clone()));

        if let Some(post) = Self::hook::<I>(&self.post) {
            let post_result = call(&post);
            if self.controller.is_overridden() {
                trace!(capability = std::any::type_name::<I>(), "Result overridden by post hook");
                return post_result;
            }
        }

        result
    }

    fn hook<I: ?Sized + 'static>(hooks: &Hooks) -> Option<Arc<I>> {
        hooks
            .read()
            .get(&TypeId::of::<I>())
            .and_then(|hook| hook.downcast_ref::<Arc<I>>())
            .cloned()
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("pre", &self.pre.read().len())
            .field("post", &self.post.read().len())
            .finish()
    }
}

#[derive(Default)]
struct InvocationState {
    vetoed: bool,
    overridden: bool,
    instance: Option<Instance>,
    original: Option<Arc<dyn Any + Send + Sync>>,
}

/// Per-thread state of the intercepted call in progress.
///
/// Cleared at the start of every intercepted call. A thread's state goes
/// away when the thread exits.
#[derive(Clone, Default)]
pub struct InvocationController {
    states: ThreadTable<InvocationState>,
}

impl InvocationController {
    /// From a pre hook: skip the real call and return the hook's result.
    pub fn veto(&self) {
        self.state_mut(|state| state.vetoed = true);
    }

    /// From a post hook: return the hook's result instead of the real one.
    pub fn override_result(&self) {
        self.state_mut(|state| state.overridden = true);
    }

    pub fn is_vetoed(&self) -> bool {
        self.state(|state| state.vetoed).unwrap_or(false)
    }

    pub fn is_overridden(&self) -> bool {
        self.state(|state| state.overridden).unwrap_or(false)
    }

    /// The live instance behind the proxy.
    pub fn instance(&self) -> Option<Instance> {
        self.state(|state| state.instance.clone()).flatten()
    }

    /// What the real call returned. Only available to post hooks.
    pub fn original_return_value<R: Clone + 'static>(&self) -> Option<R> {
        self.state(|state| {
            state
                .original
                .as_ref()
                .and_then(|value| value.downcast_ref::<R>())
                .cloned()
        })
        .flatten()
    }

    pub fn clear(&self) {
        self.states.set_current(InvocationState::default());
    }

    fn set_instance(&self, instance: Instance) {
        self.state_mut(|state| state.instance = Some(instance));
    }

    fn set_original(&self, value: Arc<dyn Any + Send + Sync>) {
        self.state_mut(|state| state.original = Some(value));
    }

    fn state<R>(&self, f: impl FnOnce(&InvocationState) -> R) -> Option<R> {
        self.states.current().map(|state| f(&state))
    }

    fn state_mut(&self, f: impl FnOnce(&mut InvocationState)) {
        let mut state = self.states.current_or_insert_with(InvocationState::default);
        f(&mut state);
    }
}

impl fmt::Debug for InvocationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationController")
            .field("vetoed", &self.is_vetoed())
            .field("overridden", &self.is_overridden())
            .finish()
    }
}

//! Container lifecycle: the state machine and the component-level strategies.

mod state;
mod strategy;

pub use state::LifecycleState;
pub use strategy::{
    Disposable, LifecycleStrategy, NullLifecycleStrategy, Startable, StartableLifecycleStrategy,
};

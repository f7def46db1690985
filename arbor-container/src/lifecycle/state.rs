//! Container lifecycle states.
//!
//! The only legal path is
//! `CONSTRUCTED → STARTED → STOPPED → STARTED → … → DISPOSED`.
//! `DISPOSED` is absorbing.

use std::fmt;

use crate::error::{ArborError, IllegalTransitionError, Result};

/// Where a container is in its lifecycle.
///
/// # Examples
/// ```
/// use arbor_container::lifecycle::LifecycleState;
///
/// let mut state = LifecycleState::default();
/// assert!(state.starting("root").is_ok());
/// state.started();
/// assert!(state.is_started());
/// assert!(state.starting("root").is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built, never started.
    #[default]
    Constructed,
    /// Components started.
    Started,
    /// Components stopped, may be started again.
    Stopped,
    /// Terminal.
    Disposed,
}

impl LifecycleState {
    /// Checks that components may be removed.
    pub fn removing_component(&self, container: &str) -> Result<()> {
        match self {
            LifecycleState::Started | LifecycleState::Disposed => {
                Err(self.illegal(container, "remove components from"))
            }
            _ => Ok(()),
        }
    }

    pub fn starting(&self, container: &str) -> Result<()> {
        match self {
            LifecycleState::Constructed | LifecycleState::Stopped => Ok(()),
            _ => Err(self.illegal(container, "start")),
        }
    }

    pub fn started(&mut self) {
        *self = LifecycleState::Started;
    }

    pub fn stopping(&self, container: &str) -> Result<()> {
        match self {
            LifecycleState::Started => Ok(()),
            _ => Err(self.illegal(container, "stop")),
        }
    }

    pub fn stopped(&mut self) {
        *self = LifecycleState::Stopped;
    }

    pub fn disposing(&self, container: &str) -> Result<()> {
        match self {
            LifecycleState::Constructed | LifecycleState::Stopped => Ok(()),
            _ => Err(self.illegal(container, "dispose")),
        }
    }

    pub fn disposed(&mut self) {
        *self = LifecycleState::Disposed;
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        matches!(self, LifecycleState::Stopped)
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        matches!(self, LifecycleState::Disposed)
    }

    fn illegal(&self, container: &str, operation: &'static str) -> ArborError {
        ArborError::IllegalLifecycleTransition(IllegalTransitionError {
            container: container.to_string(),
            operation,
            state: *self,
        })
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Constructed => write!(f, "CONSTRUCTED"),
            LifecycleState::Started => write!(f, "STARTED"),
            LifecycleState::Stopped => write!(f, "STOPPED"),
            LifecycleState::Disposed => write!(f, "DISPOSED"),
        }
    }
}

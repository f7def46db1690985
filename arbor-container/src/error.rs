//! Error types for Arbor container operations.
//!
//! Every failure the engine reports is an [`ArborError`]. The messages are
//! meant to be read by the person wiring the container, so the structured
//! variants render a short explanation and a `Hint:` line.

use std::fmt;

use arbor_support::rendering::{render_candidates, render_chain};

use crate::implementation::BoxError;
use crate::key::{ComponentKey, TypeInfo};
use crate::lifecycle::LifecycleState;
use crate::properties::Properties;

/// Main error type for all Arbor operations.
#[derive(Debug, thiserror::Error)]
pub enum ArborError {
    /// A component is already registered under this key.
    #[error("{}", .0)]
    DuplicateKey(DuplicateKeyError),

    /// Nothing compatible was found anywhere up the parent chain.
    #[error("{}", .0)]
    UnsatisfiedDependency(UnsatisfiedDependencyError),

    /// More than one compatible candidate and nothing to break the tie.
    #[error("{}", .0)]
    AmbiguousResolution(AmbiguousResolutionError),

    /// A component transitively requested itself.
    #[error("{}", .0)]
    CyclicDependency(CyclicDependencyError),

    /// start/stop/dispose/remove called in a state that forbids it.
    #[error("{}", .0)]
    IllegalLifecycleTransition(IllegalTransitionError),

    /// Flags nobody consumed while building the behavior stack.
    #[error(
        "Unprocessed configuration flags: {0}\n  Hint: check the spelling, or drop flags this kind of registration does not support"
    )]
    UnprocessedConfiguration(Properties),

    /// The implementation type cannot be constructed.
    #[error(
        "Cannot construct {0}: it is not a concrete type\n  Hint: register an instance or a provider for it instead"
    )]
    NotConcreteType(TypeInfo),

    /// A user factory failed.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: ComponentKey,
        #[source]
        source: BoxError,
    },

    /// A component-level start/stop/dispose hook failed.
    #[error("Failed to {phase} {key}: {source}")]
    LifecycleFailed {
        key: ComponentKey,
        phase: &'static str,
        #[source]
        source: BoxError,
    },

    /// The component cannot be viewed as the requested type.
    #[error("Component {key} cannot be viewed as {requested}")]
    NotAssignable {
        key: ComponentKey,
        requested: TypeInfo,
    },

    /// Component-level lifecycle misuse (already started, not started, ...).
    #[error("'{key}' {problem}")]
    ComponentState {
        key: ComponentKey,
        problem: &'static str,
    },

    /// A guard refused production.
    #[error("Guard {guard} rejected {key}: {source}")]
    GuardRejected {
        key: ComponentKey,
        guard: ComponentKey,
        #[source]
        source: BoxError,
    },

    /// Miscellaneous wiring error.
    #[error("{0}")]
    Composition(String),
}

impl ArborError {
    pub fn is_cyclic(&self) -> bool {
        matches!(self, ArborError::CyclicDependency(_))
    }

    /// Recovers an `ArborError` that travelled through a user factory via `?`,
    /// otherwise wraps the failure as a construction error for `key`.
    pub(crate) fn from_factory(key: &ComponentKey, error: BoxError) -> Self {
        match error.downcast::<ArborError>() {
            Ok(arbor) => *arbor,
            Err(source) => ArborError::ConstructionFailed {
                key: key.clone(),
                source,
            },
        }
    }

    pub(crate) fn unsatisfied(requested: impl ToString) -> Self {
        ArborError::UnsatisfiedDependency(UnsatisfiedDependencyError {
            requested: requested.to_string(),
            required_by: None,
            suggestions: Vec::new(),
        })
    }
}

/// Error when registering a second component under the same key.
#[derive(Debug)]
pub struct DuplicateKeyError {
    pub key: ComponentKey,
}

impl fmt::Display for DuplicateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duplicate keys not allowed. Duplicate for {}", self.key)?;
        write!(
            f,
            "\n  Hint: remove the existing component first, or register under a name or qualifier"
        )
    }
}

/// Error when a dependency cannot be satisfied.
#[derive(Debug)]
pub struct UnsatisfiedDependencyError {
    /// What was asked for (type name or key)
    pub requested: String,
    /// The component whose construction needed it (if known)
    pub required_by: Option<ComponentKey>,
    /// Registered keys that look similar
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnsatisfiedDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsatisfied dependency: {}", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register a component assignable to it here or in a parent container"
        )
    }
}

/// Error when several candidates satisfy one request.
#[derive(Debug)]
pub struct AmbiguousResolutionError {
    pub requested: TypeInfo,
    /// Implementation types of every candidate
    pub candidates: Vec<TypeInfo>,
}

impl fmt::Display for AmbiguousResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.candidates.iter().map(|c| c.type_name()).collect();
        write!(
            f,
            "{} has ambiguous dependency on {} candidates: {}",
            self.requested.short_name(),
            self.candidates.len(),
            render_candidates(&names),
        )?;
        write!(
            f,
            "\n  Hint: ask by key, give the dependency a name and enable use-names, or use a qualifier"
        )
    }
}

/// Error when a component transitively depends on itself.
///
/// Shows the chain so you can see where the cycle closes.
#[derive(Debug)]
pub struct CyclicDependencyError {
    /// Example: `[A, B, A]`
    pub chain: Vec<TypeInfo>,
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(TypeInfo::short_name).collect();
        write!(f, "Cyclic dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: inject a Provider for one side of the cycle, or move one side into a parent container"
        )
    }
}

/// Error when a lifecycle operation is not allowed in the current state.
#[derive(Debug)]
pub struct IllegalTransitionError {
    pub container: String,
    pub operation: &'static str,
    pub state: LifecycleState,
}

impl fmt::Display for IllegalTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot {} container '{}'. Current container state was: {}",
            self.operation, self.container, self.state,
        )
    }
}

/// Convenient Result type for Arbor operations.
pub type Result<T> = std::result::Result<T, ArborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfied_dependency_display() {
        let err = ArborError::UnsatisfiedDependency(UnsatisfiedDependencyError {
            requested: "app::Database".into(),
            required_by: Some(ComponentKey::of::<Vec<u8>>()),
            suggestions: vec!["app::DatabasePool".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Unsatisfied"));
        assert!(msg.contains("Required by"));
        assert!(msg.contains("DatabasePool"));
    }

    #[test]
    fn cyclic_dependency_display() {
        let err = ArborError::CyclicDependency(CyclicDependencyError {
            chain: vec![
                TypeInfo::of::<String>(),
                TypeInfo::of::<i32>(),
                TypeInfo::of::<String>(),
            ],
        });

        let msg = format!("{err}");
        assert!(msg.contains("String → i32 → String"));
        assert!(err.is_cyclic());
    }

    #[test]
    fn ambiguous_lists_candidates() {
        let err = ArborError::AmbiguousResolution(AmbiguousResolutionError {
            requested: TypeInfo::of::<String>(),
            candidates: vec![TypeInfo::of::<u8>(), TypeInfo::of::<u16>()],
        });

        assert!(format!("{err}").contains("[u8, u16]"));
    }

    #[test]
    fn illegal_transition_display() {
        let err = ArborError::IllegalLifecycleTransition(IllegalTransitionError {
            container: "root".into(),
            operation: "stop",
            state: LifecycleState::Constructed,
        });

        assert_eq!(
            err.to_string(),
            "Cannot stop container 'root'. Current container state was: CONSTRUCTED"
        );
    }

    #[test]
    fn factory_errors_keep_their_kind() {
        let cyclic: BoxError = Box::new(ArborError::CyclicDependency(CyclicDependencyError {
            chain: vec![],
        }));
        assert!(ArborError::from_factory(&ComponentKey::of::<u8>(), cyclic).is_cyclic());

        let io: BoxError = "disk on fire".into();
        match ArborError::from_factory(&ComponentKey::of::<u8>(), io) {
            ArborError::ConstructionFailed { source, .. } => {
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("Expected ConstructionFailed, got: {other:?}"),
        }
    }
}

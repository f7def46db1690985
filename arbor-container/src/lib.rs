//! Core container implementation for Arbor.
//!
//! Components are registered on a [`Container`] under a [`ComponentKey`],
//! wrapped in behavior layers chosen by [`Properties`], and produced on
//! demand with their dependencies resolved through the container tree.

pub mod adapter;
pub mod behaviors;
pub mod container;
pub mod error;
pub mod implementation;
pub mod key;
pub mod lifecycle;
pub mod monitor;
pub mod properties;
pub mod provider;
mod registry;
pub mod resolver;
pub mod visitor;

pub use container::prelude;
pub use container::{Container, ContainerBuilder, ParentView, Registrar};
pub use error::{ArborError, Result};
pub use key::ComponentKey;
pub use properties::{Characteristic, Properties};

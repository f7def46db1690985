//! # Arbor: a hierarchical composition container for Rust
//!
//! Register components on a [`Container`], let it wire their dependencies by
//! type, name or explicit key, and drive their start/stop/dispose lifecycle
//! across a tree of nested containers.
//!
//! ```rust
//! use arbor::prelude::*;
//!
//! struct Config { url: &'static str }
//! struct Repository { config: std::sync::Arc<Config> }
//!
//! let app = Container::builder().name("app").behavior(Behavior::Caching).build();
//! app.add_instance(ComponentKey::of::<Config>(), Component::of(Config { url: "mem://" }))
//!     .unwrap();
//!
//! let request = app.make_child_container();
//! request
//!     .add_component(
//!         ComponentKey::of::<Repository>(),
//!         Constructor::new(|args| Ok(Repository { config: args.get::<Config>(0)? }))
//!             .depends_on(Dependency::on::<Config>()),
//!     )
//!     .unwrap();
//!
//! let repository = request.component::<Repository>().unwrap();
//! assert_eq!(repository.config.url, "mem://");
//! ```

pub use arbor_container::*;
pub use arbor_support::*;

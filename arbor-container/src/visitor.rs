//! Walking a container tree.
//!
//! [`Container::accept`] calls back into a [`ContainerVisitor`] for the
//! container, its behavior pipeline, every layer of every registered adapter
//! (outermost first), then recurses into the children.

use arbor_support::rendering::{StackLayer, render_stack};

use crate::adapter::ComponentAdapter;
use crate::behaviors::BehaviorPipeline;
use crate::container::Container;

/// Callbacks for [`Container::accept`].
pub trait ContainerVisitor {
    /// Return `false` to skip this container and its children.
    fn visit_container(&mut self, _container: &Container) -> bool {
        true
    }

    fn visit_behavior_pipeline(&mut self, _pipeline: &BehaviorPipeline) {}

    /// Called once per layer, so a cached component is seen as its cache
    /// layer and then its base adapter.
    fn visit_adapter(&mut self, _adapter: &dyn ComponentAdapter) {}
}

/// Renders each container and the behavior stack of each component.
///
/// ```rust
/// use arbor_container::prelude::*;
/// use arbor_container::visitor::DescribingVisitor;
///
/// let container = Container::builder().name("app").build();
/// container
///     .with(Characteristic::CACHE)
///     .add_instance("answer", Component::of(42u32))
///     .unwrap();
///
/// let mut visitor = DescribingVisitor::default();
/// container.accept(&mut visitor);
///
/// let text = visitor.finish();
/// assert!(text.starts_with("app:1<|"));
/// assert!(text.contains("Cached"));
/// ```
#[derive(Debug, Default)]
pub struct DescribingVisitor {
    output: String,
    layers: Vec<StackLayer>,
}

impl DescribingVisitor {
    /// The rendered tree.
    pub fn finish(mut self) -> String {
        self.flush();
        self.output
    }

    fn flush(&mut self) {
        if !self.layers.is_empty() {
            self.output.push_str(&render_stack(&self.layers));
            self.layers.clear();
        }
    }
}

impl ContainerVisitor for DescribingVisitor {
    fn visit_container(&mut self, container: &Container) -> bool {
        self.flush();
        self.output.push_str(&format!("{container}\n"));
        true
    }

    fn visit_adapter(&mut self, adapter: &dyn ComponentAdapter) {
        self.layers.push(StackLayer {
            descriptor: adapter.descriptor(),
            key: adapter.key().short(),
        });
        // innermost layer closes the stack
        if adapter.delegate().is_none() {
            self.flush();
        }
    }
}

mod builder;
mod component;
mod container;
mod extractor;
mod injectable;

pub use builder::ContainerBuilder;
pub use component::{Capability, ComponentKind, Instrumentable};
pub use container::Container;
pub use extractor::{HasContainer, Inject};
pub use injectable::Injectable;

use crate::di::{Container, Injectable};
use crate::error::Result;
use std::sync::Arc;

/// Fluent assembly of an application's container
///
/// Registration order matters only for [`ContainerBuilder::provide`], which
/// resolves its dependencies from what is registered so far.
///
/// ```
/// use suitekit::ContainerBuilder;
///
/// struct Clock;
///
/// let container = ContainerBuilder::new().register(Clock).build();
/// assert!(container.has::<Clock>());
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static>(self, instance: T) -> Self {
        self.container.set(instance);
        self
    }

    /// Register a singleton the caller keeps a handle to
    pub fn register_arc<T: Send + Sync + 'static>(self, instance: Arc<T>) -> Self {
        self.container.set_arc(instance);
        self
    }

    /// Build `T` from the registrations so far and register it
    pub fn provide<T: Injectable>(self) -> Result<Self> {
        T::provide(&self.container)?;
        Ok(self)
    }

    /// Make `Arc<dyn Trait>` resolve to the registered `Impl`
    pub fn bind<Trait, Impl, F>(self, caster: F) -> Self
    where
        Trait: ?Sized + Send + Sync + 'static,
        Impl: Send + Sync + 'static,
        F: Fn(Arc<Impl>) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.container.bind::<Trait, Impl, F>(caster);
        self
    }

    pub fn build(self) -> Container {
        self.container
    }
}

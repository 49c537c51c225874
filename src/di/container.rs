use crate::error::{Result, SuiteError};
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

type Shared = Arc<dyn Any + Send + Sync>;

/// Turns the implementation's `Arc<Impl>` into a boxed `Arc<dyn Trait>`
type Caster = Arc<dyn Fn(Shared) -> Option<Shared> + Send + Sync>;

#[derive(Clone)]
struct Binding {
    implementation: TypeId,
    cast: Caster,
}

/// Thread-safe singleton registry shared by an application and the harness
///
/// Every instance lives behind one `Arc`; `get` hands out clones of it, so
/// state changed through interior mutability, including an installed mock,
/// is seen by every holder. All operations take `&self`.
#[derive(Default)]
pub struct Container {
    services: DashMap<TypeId, Shared>,
    bindings: DashMap<TypeId, Binding>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance`, replacing any previous instance of `T`
    pub fn set<T: Send + Sync + 'static>(&self, instance: T) -> &Self {
        self.set_arc(Arc::new(instance))
    }

    pub fn set_arc<T: Send + Sync + 'static>(&self, instance: Arc<T>) -> &Self {
        self.services.insert(TypeId::of::<T>(), instance);
        self
    }

    /// Resolve `Arc<dyn Trait>` to whatever `Impl` is registered at lookup time
    pub fn bind<Trait, Impl, F>(&self, cast: F) -> &Self
    where
        Trait: ?Sized + Send + Sync + 'static,
        Impl: Send + Sync + 'static,
        F: Fn(Arc<Impl>) -> Arc<Trait> + Send + Sync + 'static,
    {
        let cast: Caster = Arc::new(move |instance: Shared| {
            let concrete = instance.downcast::<Impl>().ok()?;
            Some(Arc::new(cast(concrete)) as Shared)
        });
        self.bindings.insert(
            TypeId::of::<Trait>(),
            Binding {
                implementation: TypeId::of::<Impl>(),
                cast,
            },
        );
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.instance(TypeId::of::<T>(), type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| downcast_failed::<T>())
    }

    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let binding = self
            .bindings
            .get(&TypeId::of::<T>())
            .map(|binding| binding.value().clone())
            .ok_or_else(|| SuiteError::DependencyNotFound {
                type_name: format!("{} (no binding)", type_name::<T>()),
            })?;

        let instance = self.instance(binding.implementation, type_name::<T>())?;
        let boxed = (binding.cast)(instance)
            .ok_or_else(downcast_failed::<T>)?
            .downcast::<Arc<T>>()
            .map_err(|_| downcast_failed::<T>())?;
        Ok(Arc::clone(&*boxed))
    }

    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.services.contains_key(&id) || self.bindings.contains_key(&id)
    }

    /// Drop every registration
    ///
    /// Instances stay alive for as long as someone else holds an `Arc` to them.
    pub fn reset(&self) {
        self.services.clear();
        self.bindings.clear();
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn instance(&self, id: TypeId, requested: &str) -> Result<Shared> {
        self.services
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SuiteError::DependencyNotFound {
                type_name: requested.to_string(),
            })
    }
}

fn downcast_failed<T: ?Sized>() -> SuiteError {
    SuiteError::DowncastFailed {
        type_name: type_name::<T>().to_string(),
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.services.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

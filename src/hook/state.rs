use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// Private key/value state of one hook
///
/// Values are stored type-erased and read back by cloning; a hook keeps
/// its own bag and never hands it to another hook.
#[derive(Clone, Default)]
pub struct HookState {
    values: Arc<DashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl HookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value; `None` if absent or stored with another type
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Update a value in place, starting from `T::default()` when absent
    pub fn update<T, F>(&self, key: &str, f: F)
    where
        T: Clone + Default + Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        let mut value = self.get::<T>(key).unwrap_or_default();
        f(&mut value);
        self.set(key, value);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&self) {
        self.values.clear();
    }
}

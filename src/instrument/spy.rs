use super::method::{MethodError, OriginalMethod};
use super::mock::ensure_permitted;
use super::record::{recorded, CallLog, Outcome};
use super::restore::Restoration;
use crate::di::{Capability, Container, Instrumentable};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Records calls to one method while still running its real implementation
pub struct SpyHandle<A, T> {
    method: Arc<str>,
    log: Arc<CallLog<A, T>>,
    original: OriginalMethod<A, T>,
    restoration: Restoration,
}

impl<A, T> Clone for SpyHandle<A, T> {
    fn clone(&self) -> Self {
        Self {
            method: Arc::clone(&self.method),
            log: Arc::clone(&self.log),
            original: self.original.clone(),
            restoration: self.restoration.clone(),
        }
    }
}

impl<A, T> SpyHandle<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn call_count(&self) -> usize {
        self.log.call_count()
    }

    pub fn calls(&self) -> Vec<A> {
        self.log.calls()
    }

    pub fn last_call(&self) -> Option<A> {
        self.log.last_call()
    }

    pub fn outcomes(&self) -> Vec<Outcome<T>> {
        self.log.outcomes()
    }

    pub fn results(&self) -> Vec<T> {
        self.log.results()
    }

    pub fn errors(&self) -> Vec<MethodError> {
        self.log.errors()
    }

    pub fn log(&self) -> Arc<CallLog<A, T>> {
        Arc::clone(&self.log)
    }

    /// The real implementation, called without being recorded
    pub fn original(&self) -> OriginalMethod<A, T> {
        self.original.clone()
    }

    /// Stop recording; the log keeps what it has seen so far
    pub fn restore(&self) -> bool {
        self.restoration.restore()
    }

    pub fn is_restored(&self) -> bool {
        self.restoration.is_restored()
    }

    pub fn restoration(&self) -> Restoration {
        self.restoration.clone()
    }
}

impl<A, T> fmt::Debug for SpyHandle<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpyHandle")
            .field("method", &self.method)
            .field("restored", &self.restoration.is_restored())
            .finish()
    }
}

/// Spy on `method` of a live instance
pub fn spy_on<S, A, T>(target: &Arc<S>, method: &str) -> Result<SpyHandle<A, T>>
where
    S: Instrumentable,
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    ensure_permitted::<S>(Capability::Spy)?;

    let log = Arc::new(CallLog::<A, T>::new());
    let recorder = Arc::clone(&log);
    let original = target
        .methods()
        .instrument::<A, T, _>(method, Capability::Spy, move |original| {
            recorded(original, recorder)
        })?;

    let type_name = std::any::type_name::<S>();
    tracing::debug!(target_type = type_name, method, "Spy installed");

    let bound = OriginalMethod::bind(method, target, original.clone());
    let owner = Arc::clone(target);
    let name = method.to_string();
    let restoration = Restoration::new(format!("spy {type_name}::{method}"), move || {
        owner.methods().reinstate(&name, original)
    });

    Ok(SpyHandle {
        method: Arc::from(method),
        log,
        original: bound,
        restoration,
    })
}

/// Resolve the singleton of `S` from `container` and spy on `method`
pub fn spy<S, A, T>(container: &Container, method: &str) -> Result<SpyHandle<A, T>>
where
    S: Instrumentable,
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    ensure_permitted::<S>(Capability::Spy)?;
    let target = container.get::<S>()?;
    spy_on(&target, method)
}

//! Method tables: the dispatch point for instrumentable methods

use crate::di::Capability;
use crate::error::{Result, SuiteError};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Result type of every instrumentable method
pub type MethodResult<T> = std::result::Result<T, MethodError>;

/// Error produced by an instrumentable method
///
/// Cheap to clone, so a spy can keep the exact error it saw while the same
/// error keeps propagating to the caller.
#[derive(Clone)]
pub struct MethodError(Arc<anyhow::Error>);

impl MethodError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(error)))
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether both values are clones of the same error
    pub fn same_as(&self, other: &MethodError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for MethodError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for MethodError {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl From<SuiteError> for MethodError {
    fn from(error: SuiteError) -> Self {
        Self::new(error)
    }
}

/// Whether a method settles immediately or through a future
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Flavor {
    Sync,
    Async,
}

pub type SyncMethod<S, A, T> = Arc<dyn Fn(&S, A) -> MethodResult<T> + Send + Sync>;
pub type AsyncMethod<S, A, T> =
    Arc<dyn Fn(Arc<S>, A) -> BoxFuture<'static, MethodResult<T>> + Send + Sync>;

/// An implementation of one method of receiver `S`, taking `A` and producing `T`
///
/// Synchronous implementations borrow the receiver; asynchronous ones get
/// an owned `Arc<S>` so the returned future is `'static`.
pub enum Callable<S, A, T> {
    Sync(SyncMethod<S, A, T>),
    Async(AsyncMethod<S, A, T>),
}

impl<S, A, T> Clone for Callable<S, A, T> {
    fn clone(&self) -> Self {
        match self {
            Callable::Sync(f) => Callable::Sync(Arc::clone(f)),
            Callable::Async(f) => Callable::Async(Arc::clone(f)),
        }
    }
}

impl<S, A, T> Callable<S, A, T>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&S, A) -> MethodResult<T> + Send + Sync + 'static,
    {
        Callable::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult<T>> + Send + 'static,
    {
        Callable::Async(Arc::new(move |receiver: Arc<S>, args: A| {
            f(receiver, args).boxed()
        }))
    }

    /// An implementation with the given flavor that ignores its inputs
    pub(crate) fn constant<F>(flavor: Flavor, produce: F) -> Self
    where
        F: Fn() -> MethodResult<T> + Send + Sync + 'static,
    {
        match flavor {
            Flavor::Sync => Callable::Sync(Arc::new(move |_: &S, _: A| produce())),
            Flavor::Async => Callable::Async(Arc::new(move |_: Arc<S>, _: A| {
                futures::future::ready(produce()).boxed()
            })),
        }
    }

    pub fn flavor(&self) -> Flavor {
        match self {
            Callable::Sync(_) => Flavor::Sync,
            Callable::Async(_) => Flavor::Async,
        }
    }

    pub async fn invoke(&self, receiver: &Arc<S>, args: A) -> MethodResult<T> {
        match self {
            Callable::Sync(f) => f(receiver.as_ref(), args),
            Callable::Async(f) => f(Arc::clone(receiver), args).await,
        }
    }
}

/// An original implementation bound to the instance it was taken from
///
/// Calling it bypasses whatever mock or spy currently sits in the method
/// table, and it stays valid after the instrumentation is restored.
pub struct OriginalMethod<A, T> {
    method: Arc<str>,
    flavor: Flavor,
    invoke: Arc<dyn Fn(A) -> BoxFuture<'static, MethodResult<T>> + Send + Sync>,
}

impl<A, T> Clone for OriginalMethod<A, T> {
    fn clone(&self) -> Self {
        Self {
            method: Arc::clone(&self.method),
            flavor: self.flavor,
            invoke: Arc::clone(&self.invoke),
        }
    }
}

impl<A, T> OriginalMethod<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub(crate) fn bind<S>(method: &str, receiver: &Arc<S>, callable: Callable<S, A, T>) -> Self
    where
        S: Send + Sync + 'static,
    {
        let flavor = callable.flavor();
        let receiver = Arc::clone(receiver);
        Self {
            method: Arc::from(method),
            flavor,
            invoke: Arc::new(move |args: A| {
                let callable = callable.clone();
                let receiver = Arc::clone(&receiver);
                async move { callable.invoke(&receiver, args).await }.boxed()
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub async fn call(&self, args: A) -> MethodResult<T> {
        (self.invoke)(args).await
    }
}

impl<A, T> fmt::Debug for OriginalMethod<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginalMethod")
            .field("method", &self.method)
            .field("flavor", &self.flavor)
            .finish()
    }
}

struct Slot {
    callable: Arc<dyn Any + Send + Sync>,
    flavor: Flavor,
    installed: Option<Capability>,
}

/// Per-instance table of instrumentable methods
///
/// A component keeps one table as a field and routes each instrumentable
/// method through it. Mocks and spies swap the table entry on the live
/// instance; callers never re-resolve anything.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use suitekit::{MethodResult, MethodTable};
///
/// struct Counter {
///     methods: MethodTable<Counter>,
///     start: u32,
/// }
///
/// impl Counter {
///     fn new(start: u32) -> Self {
///         let methods = MethodTable::new();
///         methods.define_sync("next", |counter: &Counter, step: u32| Ok(counter.start + step));
///         Self { methods, start }
///     }
///
///     fn next(&self, step: u32) -> MethodResult<u32> {
///         self.methods.call_sync(self, "next", step)
///     }
/// }
///
/// assert_eq!(Counter::new(40).next(2).unwrap(), 42);
/// ```
pub struct MethodTable<S> {
    slots: DashMap<String, Slot>,
    _receiver: PhantomData<fn(&S)>,
}

impl<S> Default for MethodTable<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MethodTable<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            _receiver: PhantomData,
        }
    }

    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }

    pub fn define<A, T>(&self, name: &str, callable: Callable<S, A, T>) -> &Self
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let flavor = callable.flavor();
        self.slots.insert(
            name.to_string(),
            Slot {
                callable: Arc::new(callable),
                flavor,
                installed: None,
            },
        );
        self
    }

    pub fn define_sync<A, T, F>(&self, name: &str, f: F) -> &Self
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(&S, A) -> MethodResult<T> + Send + Sync + 'static,
    {
        self.define(name, Callable::sync(f))
    }

    pub fn define_async<A, T, F, Fut>(&self, name: &str, f: F) -> &Self
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult<T>> + Send + 'static,
    {
        self.define(name, Callable::future(f))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }

    pub fn flavor(&self, name: &str) -> Option<Flavor> {
        self.slots.get(name).map(|slot| slot.flavor)
    }

    /// Which instrumentation currently occupies the method, if any
    pub fn instrumented_by(&self, name: &str) -> Option<Capability> {
        self.slots.get(name).and_then(|slot| slot.installed)
    }

    /// Invoke a method of either flavor
    pub async fn call<A, T>(&self, receiver: &Arc<S>, name: &str, args: A) -> MethodResult<T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let callable = self.current::<A, T>(name)?;
        callable.invoke(receiver, args).await
    }

    /// Invoke a synchronous method
    pub fn call_sync<A, T>(&self, receiver: &S, name: &str, args: A) -> MethodResult<T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        match self.current::<A, T>(name)? {
            Callable::Sync(f) => f(receiver, args),
            Callable::Async(_) => Err(SuiteError::SignatureMismatch {
                type_name: self.type_name().to_string(),
                method: name.to_string(),
                message: "method is asynchronous; invoke it with `call`".to_string(),
            }
            .into()),
        }
    }

    /// The implementation currently installed for `name`
    pub(crate) fn current<A, T>(&self, name: &str) -> Result<Callable<S, A, T>>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let erased = self
            .slots
            .get(name)
            .map(|slot| Arc::clone(&slot.callable))
            .ok_or_else(|| self.unknown_method(name))?;
        self.downcast(name, erased)
    }

    /// Swap the implementation of `name`, returning the one it replaced
    ///
    /// `wrap` receives the current implementation and builds its
    /// replacement. A method holds at most one instrumentation at a time, and
    /// the replacement must keep the original's flavor.
    pub(crate) fn instrument<A, T, F>(
        &self,
        name: &str,
        capability: Capability,
        wrap: F,
    ) -> Result<Callable<S, A, T>>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Callable<S, A, T>) -> Callable<S, A, T>,
    {
        let mut slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| self.unknown_method(name))?;

        if slot.installed.is_some() {
            return Err(SuiteError::AlreadyInstrumented {
                type_name: self.type_name().to_string(),
                method: name.to_string(),
            });
        }

        let original = self.downcast::<A, T>(name, Arc::clone(&slot.callable))?;
        let replacement = wrap(&original);
        if replacement.flavor() != original.flavor() {
            return Err(SuiteError::SignatureMismatch {
                type_name: self.type_name().to_string(),
                method: name.to_string(),
                message: format!(
                    "{} replacement for a {} method",
                    replacement.flavor(),
                    original.flavor()
                ),
            });
        }

        slot.callable = Arc::new(replacement);
        slot.installed = Some(capability);
        tracing::debug!(
            target_type = self.type_name(),
            method = name,
            capability = %capability,
            "Installed instrumentation"
        );
        Ok(original)
    }

    /// Put a saved implementation back and clear the instrumentation mark
    pub(crate) fn reinstate<A, T>(&self, name: &str, original: Callable<S, A, T>)
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        if let Some(mut slot) = self.slots.get_mut(name) {
            slot.callable = Arc::new(original);
            slot.installed = None;
            tracing::debug!(
                target_type = self.type_name(),
                method = name,
                "Restored original implementation"
            );
        }
    }

    fn downcast<A, T>(
        &self,
        name: &str,
        erased: Arc<dyn Any + Send + Sync>,
    ) -> Result<Callable<S, A, T>>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        erased
            .downcast::<Callable<S, A, T>>()
            .map(|callable| callable.as_ref().clone())
            .map_err(|_| SuiteError::SignatureMismatch {
                type_name: self.type_name().to_string(),
                method: name.to_string(),
                message: format!(
                    "expected ({}) -> {}",
                    std::any::type_name::<A>(),
                    std::any::type_name::<T>()
                ),
            })
    }

    fn unknown_method(&self, name: &str) -> SuiteError {
        SuiteError::UnknownMethod {
            type_name: self.type_name().to_string(),
            method: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        methods: MethodTable<Greeter>,
        greeting: String,
    }

    impl Greeter {
        fn new() -> Arc<Self> {
            let methods = MethodTable::new();
            methods.define_sync("greet", |greeter: &Greeter, name: String| {
                Ok(format!("{}, {}", greeter.greeting, name))
            });
            methods.define_async("shout", |greeter: Arc<Greeter>, name: String| async move {
                Ok(format!("{}, {}!", greeter.greeting.to_uppercase(), name))
            });
            Arc::new(Self {
                methods,
                greeting: "hello".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_call_dispatches_both_flavors() {
        let greeter = Greeter::new();

        let sync: String = greeter
            .methods
            .call(&greeter, "greet", "ada".to_string())
            .await
            .unwrap();
        let future: String = greeter
            .methods
            .call(&greeter, "shout", "ada".to_string())
            .await
            .unwrap();

        assert_eq!(sync, "hello, ada");
        assert_eq!(future, "HELLO, ada!");
    }

    #[test]
    fn test_call_sync_rejects_async_methods() {
        let greeter = Greeter::new();
        let err = greeter
            .methods
            .call_sync::<String, String>(&greeter, "shout", "ada".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("asynchronous"));
    }

    #[test]
    fn test_signature_mismatch_names_the_method() {
        let greeter = Greeter::new();
        let err = greeter
            .methods
            .call_sync::<u32, String>(&greeter, "greet", 7)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Greeter"));
        assert!(message.contains("greet"));
    }

    #[test]
    fn test_instrument_enforces_flavor_and_exclusivity() {
        let greeter = Greeter::new();

        let flavor_err = greeter
            .methods
            .instrument::<String, String, _>("greet", Capability::Mock, |_| {
                Callable::constant(Flavor::Async, || Ok(String::new()))
            })
            .err()
            .unwrap();
        assert!(matches!(flavor_err, SuiteError::SignatureMismatch { .. }));

        let original = greeter
            .methods
            .instrument::<String, String, _>("greet", Capability::Mock, |_| {
                Callable::constant(Flavor::Sync, || Ok("mocked".to_string()))
            })
            .unwrap();
        assert_eq!(greeter.methods.instrumented_by("greet"), Some(Capability::Mock));

        let second = greeter
            .methods
            .instrument::<String, String, _>("greet", Capability::Spy, |current| current.clone())
            .err()
            .unwrap();
        assert!(matches!(second, SuiteError::AlreadyInstrumented { .. }));

        greeter.methods.reinstate("greet", original);
        assert_eq!(greeter.methods.instrumented_by("greet"), None);
        assert_eq!(
            greeter
                .methods
                .call_sync::<String, String>(&greeter, "greet", "bo".to_string())
                .unwrap(),
            "hello, bo"
        );
    }
}

use super::method::{Callable, MethodError, MethodResult, OriginalMethod};
use super::record::{recorded, CallLog, ErasedLog};
use super::restore::Restoration;
use crate::di::{Capability, Container, Instrumentable};
use crate::error::{Result, SuiteError};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct Installed {
    method: String,
    log: Arc<dyn ErasedLog>,
    // `OriginalMethod<A, T>` for the method's signature
    original: Arc<dyn Any + Send + Sync>,
    undo: Box<dyn FnOnce() + Send>,
}

type Installer<S> = Box<dyn FnOnce(&Arc<S>) -> Result<Installed> + Send>;

/// Replacement implementations for some methods of `S`
///
/// Nothing changes until the mock is installed on a live instance, either
/// directly with [`Mock::install`] or through [`mock`] against a container.
pub struct Mock<S> {
    installers: Vec<Installer<S>>,
}

impl<S: Instrumentable> Default for Mock<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Instrumentable> Mock<S> {
    pub fn new() -> Self {
        Self {
            installers: Vec::new(),
        }
    }

    /// Replace `method` with `callable`, which must match the original's flavor
    pub fn replace<A, T>(mut self, method: &str, callable: Callable<S, A, T>) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        let method = method.to_string();
        self.installers.push(Box::new(move |target: &Arc<S>| {
            install_one(target, method, move |_| callable)
        }));
        self
    }

    pub fn sync<A, T, F>(self, method: &str, f: F) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
        F: Fn(&S, A) -> MethodResult<T> + Send + Sync + 'static,
    {
        self.replace(method, Callable::sync(f))
    }

    pub fn future<A, T, F, Fut>(self, method: &str, f: F) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult<T>> + Send + 'static,
    {
        self.replace(method, Callable::future(f))
    }

    /// Make `method` return `value` on every call, keeping its flavor
    pub fn returning<A, T>(self, method: &str, value: T) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.constant::<A, T>(method, move || Ok(value.clone()))
    }

    /// Make `method` fail with `error` on every call, keeping its flavor
    pub fn failing<A, T>(self, method: &str, error: MethodError) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.constant::<A, T>(method, move || Err(error.clone()))
    }

    fn constant<A, T>(
        mut self,
        method: &str,
        produce: impl Fn() -> MethodResult<T> + Send + Sync + 'static,
    ) -> Self
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        let method = method.to_string();
        self.installers.push(Box::new(move |target: &Arc<S>| {
            install_one::<S, A, T>(target, method, move |original| {
                Callable::constant(original.flavor(), produce)
            })
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.installers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }

    /// Install every replacement on `target`
    ///
    /// Either all replacements are installed or none are: a failure rolls
    /// back the ones already applied.
    pub fn install(self, target: &Arc<S>) -> Result<MockHandle> {
        ensure_permitted::<S>(Capability::Mock)?;

        let mut installed: Vec<Installed> = Vec::with_capacity(self.installers.len());
        for installer in self.installers {
            match installer(target) {
                Ok(entry) => installed.push(entry),
                Err(e) => {
                    for entry in installed.into_iter().rev() {
                        (entry.undo)();
                    }
                    return Err(e);
                }
            }
        }

        let type_name = std::any::type_name::<S>();
        let methods: Vec<String> = installed.iter().map(|entry| entry.method.clone()).collect();
        let mut logs = HashMap::with_capacity(installed.len());
        let mut originals = HashMap::with_capacity(installed.len());
        let mut undos = Vec::with_capacity(installed.len());
        for entry in installed {
            originals.insert(entry.method.clone(), entry.original);
            logs.insert(entry.method, entry.log);
            undos.push(entry.undo);
        }

        tracing::info!(target_type = type_name, methods = ?methods, "Mock installed");

        let restoration = Restoration::new(format!("mock {type_name}"), move || {
            for undo in undos.into_iter().rev() {
                undo();
            }
        });

        Ok(MockHandle {
            inner: Arc::new(MockHandleInner {
                type_name,
                methods,
                logs,
                originals,
                restoration,
            }),
        })
    }
}

fn install_one<S, A, T>(
    target: &Arc<S>,
    method: String,
    build: impl FnOnce(&Callable<S, A, T>) -> Callable<S, A, T>,
) -> Result<Installed>
where
    S: Instrumentable,
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    let log = Arc::new(CallLog::<A, T>::new());
    let recorder = Arc::clone(&log);
    let original = target
        .methods()
        .instrument::<A, T, _>(&method, Capability::Mock, move |original| {
            recorded(&build(original), recorder)
        })?;

    let bound = OriginalMethod::bind(&method, target, original.clone());
    let owner = Arc::clone(target);
    let name = method.clone();
    Ok(Installed {
        method,
        log,
        original: Arc::new(bound),
        undo: Box::new(move || owner.methods().reinstate(&name, original)),
    })
}

pub(crate) fn ensure_permitted<S: Instrumentable>(capability: Capability) -> Result<()> {
    if S::KIND.permits(capability) {
        Ok(())
    } else {
        Err(SuiteError::NotInstrumentable {
            type_name: std::any::type_name::<S>().to_string(),
            kind: S::KIND.to_string(),
            capability: capability.to_string(),
        })
    }
}

/// Resolve the singleton of `S` from `container` and install `mock` on it
///
/// Every holder of the singleton observes the replacements until the
/// returned handle is restored.
pub fn mock<S: Instrumentable>(container: &Container, mock: Mock<S>) -> Result<MockHandle> {
    ensure_permitted::<S>(Capability::Mock)?;
    let target = container.get::<S>()?;
    mock.install(&target)
}

struct MockHandleInner {
    type_name: &'static str,
    methods: Vec<String>,
    logs: HashMap<String, Arc<dyn ErasedLog>>,
    originals: HashMap<String, Arc<dyn Any + Send + Sync>>,
    restoration: Restoration,
}

/// Handle to an installed mock
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<MockHandleInner>,
}

impl MockHandle {
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Names of the replaced methods
    pub fn methods(&self) -> &[String] {
        &self.inner.methods
    }

    /// How many times the replacement for `method` has been called
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .logs
            .get(method)
            .map(|log| log.call_count())
            .unwrap_or(0)
    }

    /// Typed call log for `method`, if it was replaced with that signature
    pub fn log<A, T>(&self, method: &str) -> Option<Arc<CallLog<A, T>>>
    where
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        let log = Arc::clone(self.inner.logs.get(method)?);
        log.into_any().downcast::<CallLog<A, T>>().ok()
    }

    /// The real implementation of `method`, callable while the mock is live
    pub fn original<A, T>(&self, method: &str) -> Option<OriginalMethod<A, T>>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        self.inner
            .originals
            .get(method)?
            .downcast_ref::<OriginalMethod<A, T>>()
            .cloned()
    }

    /// Put the original implementations back; returns `false` if already restored
    pub fn restore(&self) -> bool {
        self.inner.restoration.restore()
    }

    pub fn is_restored(&self) -> bool {
        self.inner.restoration.is_restored()
    }

    pub fn restoration(&self) -> Restoration {
        self.inner.restoration.clone()
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHandle")
            .field("type_name", &self.inner.type_name)
            .field("methods", &self.inner.methods)
            .field("restored", &self.is_restored())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ComponentKind;
    use crate::instrument::MethodTable;

    struct Repo {
        methods: MethodTable<Self>,
    }

    impl Instrumentable for Repo {
        const KIND: ComponentKind = ComponentKind::Repository;

        fn methods(&self) -> &MethodTable<Self> {
            &self.methods
        }
    }

    struct Handler {
        methods: MethodTable<Self>,
    }

    impl Instrumentable for Handler {
        const KIND: ComponentKind = ComponentKind::Controller;

        fn methods(&self) -> &MethodTable<Self> {
            &self.methods
        }
    }

    fn repo() -> Arc<Repo> {
        let repo = Repo {
            methods: MethodTable::new(),
        };
        repo.methods
            .define_sync("find", |_: &Repo, id: u32| Ok(format!("user-{id}")))
            .define_async("count", |_: Arc<Repo>, _: ()| async { Ok(10usize) });
        Arc::new(repo)
    }

    #[tokio::test]
    async fn test_mock_replaces_and_restores() {
        let repo = repo();
        let handle = Mock::<Repo>::new()
            .returning::<u32, String>("find", "mocked".to_string())
            .returning::<(), usize>("count", 0)
            .install(&repo)
            .unwrap();

        assert_eq!(
            repo.methods.call_sync::<u32, String>(&repo, "find", 1).unwrap(),
            "mocked"
        );
        assert_eq!(repo.methods.call::<(), usize>(&repo, "count", ()).await.unwrap(), 0);
        assert_eq!(handle.call_count("find"), 1);
        assert_eq!(handle.log::<u32, String>("find").unwrap().calls(), vec![1]);

        assert!(handle.restore());
        assert!(!handle.restore());
        assert_eq!(
            repo.methods.call_sync::<u32, String>(&repo, "find", 1).unwrap(),
            "user-1"
        );
        assert_eq!(repo.methods.call::<(), usize>(&repo, "count", ()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_original_bypasses_live_mock() {
        let repo = repo();
        let handle = Mock::<Repo>::new()
            .returning::<u32, String>("find", "mocked".to_string())
            .returning::<(), usize>("count", 0)
            .install(&repo)
            .unwrap();

        let find = handle.original::<u32, String>("find").unwrap();
        assert_eq!(find.call(3).await.unwrap(), "user-3");
        let count = handle.original::<(), usize>("count").unwrap();
        assert_eq!(count.call(()).await.unwrap(), 10);

        assert_eq!(
            repo.methods.call_sync::<u32, String>(&repo, "find", 3).unwrap(),
            "mocked"
        );
        assert_eq!(handle.call_count("find"), 1);
        assert!(handle.original::<u32, usize>("find").is_none());
        assert!(handle.original::<u32, String>("missing").is_none());
    }

    #[test]
    fn test_failed_install_rolls_back() {
        let repo = repo();
        let result = Mock::<Repo>::new()
            .returning::<u32, String>("find", "mocked".to_string())
            .returning::<u32, String>("missing", String::new())
            .install(&repo);

        assert!(matches!(result, Err(SuiteError::UnknownMethod { .. })));
        assert!(repo.methods.instrumented_by("find").is_none());
        assert_eq!(
            repo.methods.call_sync::<u32, String>(&repo, "find", 2).unwrap(),
            "user-2"
        );
    }

    #[test]
    fn test_failing_mock_surfaces_error() {
        let repo = repo();
        let _handle = Mock::<Repo>::new()
            .failing::<u32, String>("find", MethodError::msg("database down"))
            .install(&repo)
            .unwrap();

        let err = repo.methods.call_sync::<u32, String>(&repo, "find", 1).unwrap_err();
        assert_eq!(err.to_string(), "database down");
    }

    #[test]
    fn test_controllers_cannot_be_mocked() {
        let container = Container::new();
        container.set(Handler {
            methods: MethodTable::new(),
        });

        let err = mock(&container, Mock::<Handler>::new()).unwrap_err();
        match err {
            SuiteError::NotInstrumentable { type_name, capability, .. } => {
                assert!(type_name.ends_with("Handler"));
                assert_eq!(capability, "mock");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

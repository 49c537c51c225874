use super::mock::{self, Mock, MockHandle};
use super::restore::RestoreQueue;
use super::spy::{self, SpyHandle};
use crate::app::AppView;
use crate::di::{Container, Instrumentable};
use crate::error::{Result, SuiteError};
use crate::framework::StateCell;
use crate::hook::{Hook, HookState};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::{Arc, Mutex, PoisonError};

const CONTAINER: &str = "container";

type PendingMock = Box<dyn FnOnce(&Container) -> Result<(TypeId, MockHandle)> + Send>;

fn live_container(state: &HookState, hook: &str) -> Result<Arc<Container>> {
    state
        .get::<Arc<Container>>(CONTAINER)
        .ok_or_else(|| SuiteError::resource_unavailable(hook, "DI container"))
}

/// Replaces methods on live container singletons
///
/// Mocks declared during setup are installed right after boot and stay for
/// the whole suite. Mocks installed from a test body are restored after that
/// test.
pub struct MockHook {
    gate: StateCell,
    state: HookState,
    pending: Mutex<Vec<PendingMock>>,
    suite_mocks: RestoreQueue,
    test_mocks: RestoreQueue,
    installed: DashMap<TypeId, MockHandle>,
}

impl MockHook {
    pub const NAME: &'static str = "mock";
    pub const PRIORITY: i32 = crate::library::priority::MOCK;

    pub fn new(gate: StateCell) -> Self {
        Self {
            gate,
            state: HookState::new(),
            pending: Mutex::new(Vec::new()),
            suite_mocks: RestoreQueue::new(),
            test_mocks: RestoreQueue::new(),
            installed: DashMap::new(),
        }
    }

    /// Setup entry: install `mock` for the whole suite once the application boots
    pub fn mock_for_suite<S: Instrumentable>(&self, mock: Mock<S>) -> Result<()> {
        self.gate.ensure_setup(Self::NAME)?;
        mock::ensure_permitted::<S>(crate::di::Capability::Mock)?;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(move |container: &Container| {
                let handle = mock::mock(container, mock)?;
                Ok((TypeId::of::<S>(), handle))
            }));
        Ok(())
    }

    /// Return entry: install `mock` until the current test ends
    pub fn mock<S: Instrumentable>(&self, mock: Mock<S>) -> Result<MockHandle> {
        self.gate.ensure_running(Self::NAME)?;
        let container = live_container(&self.state, Self::NAME)?;
        let handle = mock::mock(&container, mock)?;
        self.test_mocks.push(handle.restoration());
        Ok(handle)
    }

    /// Return entry: the suite-wide mock declared for `S` during setup
    pub fn mocked<S: Instrumentable>(&self) -> Result<MockHandle> {
        self.gate.ensure_running(Self::NAME)?;
        self.installed
            .get(&TypeId::of::<S>())
            .map(|handle| handle.clone())
            .ok_or_else(|| {
                SuiteError::resource_unavailable(
                    Self::NAME,
                    format!("suite mock for {}", std::any::type_name::<S>()),
                )
            })
    }

    /// Mocks declared during setup and not yet installed
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Hook for MockHook {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn after_start(&self, app: &AppView) -> Result<()> {
        self.state.set(CONTAINER, Arc::clone(app.container()));

        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        for install in pending {
            let (type_id, handle) = install(app.container())?;
            self.suite_mocks.push(handle.restoration());
            self.installed.insert(type_id, handle);
        }
        Ok(())
    }

    async fn after_each_test(&self) -> Result<()> {
        let restored = self.test_mocks.sweep();
        if restored > 0 {
            tracing::debug!(restored, "Restored test mocks");
        }
        Ok(())
    }

    async fn after_tests(&self) -> Result<()> {
        let restored = self.test_mocks.sweep() + self.suite_mocks.sweep();
        tracing::debug!(restored, "Restored all mocks");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.installed.clear();
        self.state.clear();
        Ok(())
    }
}

/// Observes methods on live container singletons
///
/// Every spy is removed after the test that installed it.
pub struct SpyHook {
    gate: StateCell,
    state: HookState,
    spies: RestoreQueue,
}

impl SpyHook {
    pub const NAME: &'static str = "spy";
    pub const PRIORITY: i32 = crate::library::priority::SPY;

    pub fn new(gate: StateCell) -> Self {
        Self {
            gate,
            state: HookState::new(),
            spies: RestoreQueue::new(),
        }
    }

    /// Return entry: spy on `method` of the singleton `S`
    pub fn spy<S, A, T>(&self, method: &str) -> Result<SpyHandle<A, T>>
    where
        S: Instrumentable,
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.gate.ensure_running(Self::NAME)?;
        let container = live_container(&self.state, Self::NAME)?;
        let handle = spy::spy::<S, A, T>(&container, method)?;
        self.spies.push(handle.restoration());
        Ok(handle)
    }

    pub fn active(&self) -> usize {
        self.spies.len()
    }
}

#[async_trait]
impl Hook for SpyHook {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn after_start(&self, app: &AppView) -> Result<()> {
        self.state.set(CONTAINER, Arc::clone(app.container()));
        Ok(())
    }

    async fn after_each_test(&self) -> Result<()> {
        self.spies.sweep();
        Ok(())
    }

    async fn after_tests(&self) -> Result<()> {
        self.spies.sweep();
        self.state.clear();
        Ok(())
    }
}

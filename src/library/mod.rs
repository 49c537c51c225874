//! Hooks Library
//!
//! The composition root: builds the hook set, registers it with a
//! [`HookManager`] and projects two capability maps. [`SetupHooks`] holds
//! the entries the setup callback may call before boot; [`ReturnHooks`]
//! holds the ones test bodies call afterwards.
//!
//! A library that adds hooks wraps another one, delegates to it first and
//! then appends its own registrations and entries:
//!
//! ```rust,ignore
//! struct MyLibrary {
//!     base: DefaultHooksLibrary,
//!     clock: Arc<ClockHook>,
//! }
//!
//! impl HooksLibrary for MyLibrary {
//!     fn state(&self) -> StateCell {
//!         self.base.state()
//!     }
//!
//!     fn register_hooks(&self, manager: &mut HookManager) {
//!         self.base.register_hooks(manager);
//!         manager.add_hook(self.clock.clone());
//!     }
//!
//!     fn setup_hooks(&self) -> Result<SetupHooks> {
//!         self.base.setup_hooks()?.with_entry("clock", ClockHook::NAME, self.clock.clone())
//!     }
//!
//!     fn return_hooks(&self) -> Result<ReturnHooks> {
//!         self.base.return_hooks()?.with_entry("clock", ClockHook::NAME, self.clock.clone())
//!     }
//! }
//! ```

mod builtin;
mod entries;

pub use builtin::{AppHook, ConfigHook, EnvHook};
pub use entries::EntryMap;

use crate::app::AppView;
use crate::config::BootConfig;
use crate::di::{Container, Instrumentable};
use crate::error::Result;
use crate::framework::StateCell;
use crate::hook::HookManager;
use crate::instrument::{Mock, MockHandle, MockHook, SpyHandle, SpyHook};
use serde_json::Value;
use std::sync::Arc;

/// Priorities of the built-in hooks
pub mod priority {
    pub const ENV: i32 = -100;
    pub const APP: i32 = -90;
    pub const CONFIG: i32 = 0;
    pub const MOCK: i32 = 100;
    pub const SPY: i32 = 110;
}

/// Composition root for the hooks of one suite
pub trait HooksLibrary: Send + Sync + 'static {
    /// Suite state shared with the hooks' entry points
    fn state(&self) -> StateCell;

    fn register_hooks(&self, manager: &mut HookManager);

    fn setup_hooks(&self) -> Result<SetupHooks>;

    fn return_hooks(&self) -> Result<ReturnHooks>;
}

/// Entries callable only from the setup callback
pub struct SetupHooks {
    entries: EntryMap,
}

impl SetupHooks {
    pub fn new(entries: EntryMap) -> Self {
        Self { entries }
    }

    /// Add an entry bound to `target`, owned by hook `hook`
    pub fn with_entry<H: Send + Sync + 'static>(
        mut self,
        name: &str,
        hook: &str,
        target: Arc<H>,
    ) -> Result<Self> {
        self.entries.insert(name, hook, target)?;
        Ok(self)
    }

    /// The hook behind entry `name`
    pub fn hook<H: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<H>> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    /// Merge `patch` into the boot configuration
    pub fn config(&self, patch: Value) -> Result<()> {
        self.hook::<ConfigHook>(ConfigHook::NAME)?.merge(patch)
    }

    /// Set a process environment variable for the suite
    ///
    /// The whole environment is restored after the suite's tests; see
    /// [`EnvHook::set`] for the concurrency requirement.
    pub fn env(&self, key: &str, value: &str) -> Result<()> {
        self.hook::<EnvHook>(EnvHook::NAME)?.set(key, value)
    }

    /// Install `mock` for the whole suite once the application boots
    pub fn mock<S: Instrumentable>(&self, mock: Mock<S>) -> Result<()> {
        self.hook::<MockHook>(MockHook::NAME)?.mock_for_suite(mock)
    }
}

/// Entries callable from test bodies once the suite is running
#[derive(Clone)]
pub struct ReturnHooks {
    entries: Arc<EntryMap>,
}

impl ReturnHooks {
    pub fn new(entries: EntryMap) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn with_entry<H: Send + Sync + 'static>(
        self,
        name: &str,
        hook: &str,
        target: Arc<H>,
    ) -> Result<Self> {
        let mut entries = Arc::unwrap_or_clone(self.entries);
        entries.insert(name, hook, target)?;
        Ok(Self::new(entries))
    }

    pub fn hook<H: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<H>> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    pub fn app(&self) -> Result<AppView> {
        self.hook::<AppHook>("app")?.app()
    }

    pub fn container(&self) -> Result<Arc<Container>> {
        self.hook::<AppHook>("container")?.container()
    }

    /// Resolve `T` from the live DI container
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.hook::<AppHook>("get")?.get::<T>()
    }

    /// The configuration the application booted with
    pub fn config(&self) -> Result<BootConfig> {
        self.hook::<ConfigHook>(ConfigHook::NAME)?.effective()
    }

    /// Install `mock` until the current test ends
    pub fn mock<S: Instrumentable>(&self, mock: Mock<S>) -> Result<MockHandle> {
        self.hook::<MockHook>(MockHook::NAME)?.mock(mock)
    }

    /// The suite-wide mock for `S` declared during setup
    pub fn mocked<S: Instrumentable>(&self) -> Result<MockHandle> {
        self.hook::<MockHook>(MockHook::NAME)?.mocked::<S>()
    }

    /// Spy on `method` of `S` until the current test ends
    pub fn spy<S, A, T>(&self, method: &str) -> Result<SpyHandle<A, T>>
    where
        S: Instrumentable,
        A: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.hook::<SpyHook>(SpyHook::NAME)?.spy::<S, A, T>(method)
    }
}

/// The built-in hook set
///
/// | hook     | priority | setup    | return                    |
/// |----------|----------|----------|---------------------------|
/// | `env`    | -100     | `env`    |                           |
/// | `app`    | -90      |          | `app`, `container`, `get` |
/// | `config` | 0        | `config` | `config`                  |
/// | `mock`   | 100      | `mock`   | `mock`                    |
/// | `spy`    | 110      |          | `spy`                     |
pub struct DefaultHooksLibrary {
    state: StateCell,
    env: Arc<EnvHook>,
    app: Arc<AppHook>,
    config: Arc<ConfigHook>,
    mock: Arc<MockHook>,
    spy: Arc<SpyHook>,
}

impl Default for DefaultHooksLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultHooksLibrary {
    pub fn new() -> Self {
        let state = StateCell::new();
        Self {
            env: Arc::new(EnvHook::new(state.clone())),
            app: Arc::new(AppHook::new(state.clone())),
            config: Arc::new(ConfigHook::new(state.clone())),
            mock: Arc::new(MockHook::new(state.clone())),
            spy: Arc::new(SpyHook::new(state.clone())),
            state,
        }
    }
}

impl HooksLibrary for DefaultHooksLibrary {
    fn state(&self) -> StateCell {
        self.state.clone()
    }

    fn register_hooks(&self, manager: &mut HookManager) {
        manager
            .add_hook(self.env.clone())
            .add_hook(self.app.clone())
            .add_hook(self.config.clone())
            .add_hook(self.mock.clone())
            .add_hook(self.spy.clone());
    }

    fn setup_hooks(&self) -> Result<SetupHooks> {
        SetupHooks::new(EntryMap::new())
            .with_entry(EnvHook::NAME, EnvHook::NAME, self.env.clone())?
            .with_entry(ConfigHook::NAME, ConfigHook::NAME, self.config.clone())?
            .with_entry(MockHook::NAME, MockHook::NAME, self.mock.clone())
    }

    fn return_hooks(&self) -> Result<ReturnHooks> {
        let mut entries = EntryMap::new();
        entries.insert("app", AppHook::NAME, self.app.clone())?;
        entries.insert("container", AppHook::NAME, self.app.clone())?;
        entries.insert("get", AppHook::NAME, self.app.clone())?;
        entries.insert(ConfigHook::NAME, ConfigHook::NAME, self.config.clone())?;
        entries.insert(MockHook::NAME, MockHook::NAME, self.mock.clone())?;
        entries.insert(SpyHook::NAME, SpyHook::NAME, self.spy.clone())?;
        Ok(ReturnHooks::new(entries))
    }
}

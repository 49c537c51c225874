use super::priority;
use crate::app::AppView;
use crate::config::{BootConfig, EnvSnapshot};
use crate::di::Container;
use crate::error::{Result, SuiteError};
use crate::framework::StateCell;
use crate::hook::{Hook, HookState};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

const APP: &str = "app";
const EFFECTIVE: &str = "effective";

/// Sets process environment variables for the suite and restores them afterwards
///
/// A suite that sets anything gets the whole environment put back after its
/// tests: variables it or the application added are removed, and changed or
/// removed ones get their captured value again.
pub struct EnvHook {
    gate: StateCell,
    requested: Mutex<Vec<(String, String)>>,
    captured: Mutex<Option<EnvSnapshot>>,
}

impl EnvHook {
    pub const NAME: &'static str = "env";

    pub fn new(gate: StateCell) -> Self {
        Self {
            gate,
            requested: Mutex::new(Vec::new()),
            captured: Mutex::new(None),
        }
    }

    /// Setup entry: set `key` to `value` before the application boots
    ///
    /// The process environment is shared by every thread. A suite using this
    /// entry must not run concurrently with other code that reads or writes
    /// the environment, other suites included.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.gate.ensure_setup(Self::NAME)?;
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.into(), value.into()));
        Ok(())
    }
}

/// Make the process environment equal to `snapshot`; returns how many variables changed
fn restore_environment(snapshot: &EnvSnapshot) -> usize {
    let mut changed = 0;
    for (key, _) in std::env::vars_os() {
        if !snapshot.contains_os(&key) {
            tracing::debug!(key = %key.to_string_lossy(), "Removing environment variable");
            // SAFETY: see `EnvHook::set`; callers guarantee no concurrent environment access.
            unsafe { std::env::remove_var(&key) };
            changed += 1;
        }
    }
    for (key, value) in snapshot.vars() {
        if std::env::var_os(&key).as_ref() != Some(&value) {
            tracing::debug!(key = %key.to_string_lossy(), "Restoring environment variable");
            // SAFETY: as above.
            unsafe { std::env::set_var(&key, &value) };
            changed += 1;
        }
    }
    changed
}

#[async_trait]
impl Hook for EnvHook {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        priority::ENV
    }

    async fn before_start(&self, config: BootConfig) -> Result<BootConfig> {
        let requested = std::mem::take(&mut *self.requested.lock().unwrap_or_else(PoisonError::into_inner));
        if requested.is_empty() {
            return Ok(config);
        }

        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(EnvSnapshot::capture);
        for (key, value) in requested {
            tracing::debug!(%key, "Setting environment variable");
            // SAFETY: see `EnvHook::set`; callers guarantee no concurrent environment access.
            unsafe { std::env::set_var(&key, &value) };
        }
        Ok(config)
    }

    async fn after_tests(&self) -> Result<()> {
        let captured = self.captured.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(snapshot) = captured {
            let changed = restore_environment(&snapshot);
            tracing::debug!(changed, "Environment restored");
        }
        Ok(())
    }
}

/// Holds the booted application and resolves from its container
pub struct AppHook {
    gate: StateCell,
    state: HookState,
}

impl AppHook {
    pub const NAME: &'static str = "app";

    pub fn new(gate: StateCell) -> Self {
        Self {
            gate,
            state: HookState::new(),
        }
    }

    /// Return entry: the booted application
    pub fn app(&self) -> Result<AppView> {
        self.gate.ensure_running(Self::NAME)?;
        self.state
            .get::<AppView>(APP)
            .ok_or_else(|| SuiteError::resource_unavailable(Self::NAME, "application"))
    }

    /// Return entry: the live DI container
    pub fn container(&self) -> Result<Arc<Container>> {
        Ok(Arc::clone(self.app()?.container()))
    }

    /// Return entry: resolve `T` from the live DI container
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.container()?.get::<T>()
    }
}

#[async_trait]
impl Hook for AppHook {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        priority::APP
    }

    async fn after_start(&self, app: &AppView) -> Result<()> {
        self.state.set(APP, app.clone());
        Ok(())
    }

    async fn after_tests(&self) -> Result<()> {
        self.state.remove(APP);
        Ok(())
    }
}

/// Merges suite configuration into the boot configuration
pub struct ConfigHook {
    gate: StateCell,
    state: HookState,
    requested: Mutex<BootConfig>,
}

impl ConfigHook {
    pub const NAME: &'static str = "config";

    pub fn new(gate: StateCell) -> Self {
        Self {
            gate,
            state: HookState::new(),
            requested: Mutex::new(BootConfig::new()),
        }
    }

    /// Setup entry: merge `patch` into the boot configuration
    ///
    /// Repeated calls accumulate; later values win per leaf.
    pub fn merge(&self, patch: Value) -> Result<()> {
        self.gate.ensure_setup(Self::NAME)?;
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(patch)
    }

    /// Return entry: the configuration the application booted with
    pub fn effective(&self) -> Result<BootConfig> {
        self.gate.ensure_running(Self::NAME)?;
        self.state
            .get::<BootConfig>(EFFECTIVE)
            .ok_or_else(|| SuiteError::resource_unavailable(Self::NAME, "effective configuration"))
    }
}

#[async_trait]
impl Hook for ConfigHook {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        priority::CONFIG
    }

    async fn before_start(&self, mut config: BootConfig) -> Result<BootConfig> {
        let requested = self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        config.absorb(requested);
        Ok(config)
    }

    async fn after_start(&self, app: &AppView) -> Result<()> {
        self.state.set(EFFECTIVE, app.config().clone());
        Ok(())
    }

    async fn after_tests(&self) -> Result<()> {
        self.state.clear();
        Ok(())
    }
}

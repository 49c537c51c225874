//! Hook Manager
//!
//! Holds the priority-sorted hook registry and runs each lifecycle phase.

use super::{Hook, Phase};
use crate::app::AppView;
use crate::config::BootConfig;
use crate::error::{Result, SuiteError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// One hook callback the manager ran
#[derive(Debug, Clone, Serialize)]
pub struct HookExecution {
    pub phase: Phase,
    pub hook: String,
    pub succeeded: bool,
    pub at: DateTime<Utc>,
}

/// Runs registered hooks phase by phase
///
/// Forward phases (`before_start`, `after_start`, `before_tests`,
/// `before_each_test`) run hooks in ascending priority and stop at the
/// first failure. Teardown phases (`after_each_test`, `after_tests`) run
/// them in **reverse order**, attempt every hook, and report the first
/// failure once all have run.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = HookManager::new();
/// manager.add_hook(Arc::new(DatabaseHook::new()));
/// manager.add_hook(Arc::new(ServerHook::new()));
///
/// let config = manager.run_before_start().await?;
/// let app = application.start(config).await?;
/// manager.run_after_start(&app).await?;
/// // ... tests ...
/// manager.run_after_tests().await?;
/// ```
pub struct HookManager {
    hooks: Vec<Arc<dyn Hook>>,
    shared_config: BootConfig,
    executions: Mutex<Vec<HookExecution>>,
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HookManager {
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            shared_config: BootConfig::new(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Register a hook, keeping the registry sorted by priority
    ///
    /// The sort is stable: hooks with equal priority keep registration order.
    pub fn add_hook(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        tracing::debug!(hook = hook.name(), priority = hook.priority(), "Registering hook");
        self.hooks.push(hook);
        self.hooks.sort_by_key(|hook| hook.priority());
        self
    }

    /// Hook names in forward execution order
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.iter().map(|hook| hook.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// The boot configuration accumulated so far
    pub fn test_config(&self) -> &BootConfig {
        &self.shared_config
    }

    /// Every callback run so far, in execution order
    pub fn executions(&self) -> Vec<HookExecution> {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Thread the boot configuration through every hook's `before_start`
    ///
    /// Each hook sees everything contributed by the hooks before it. The
    /// final accumulator is kept as the shared config and returned.
    pub async fn run_before_start(&mut self) -> Result<BootConfig> {
        tracing::info!("Running before_start hooks...");

        for hook in self.hooks.clone() {
            tracing::debug!(hook = hook.name(), "before_start");
            let outcome = hook.before_start(self.shared_config.clone()).await;
            self.record(Phase::BeforeStart, hook.as_ref(), outcome.is_ok());
            match outcome {
                Ok(config) => self.shared_config = config,
                Err(e) => {
                    tracing::error!(hook = hook.name(), error = %e, "before_start failed");
                    return Err(SuiteError::hook_failed(hook.name(), Phase::BeforeStart, e));
                }
            }
        }

        tracing::info!(
            "before_start complete ({} hooks executed, {} config keys)",
            self.hooks.len(),
            self.shared_config.len()
        );
        Ok(self.shared_config.clone())
    }

    pub async fn run_after_start(&self, app: &AppView) -> Result<()> {
        tracing::info!("Running after_start hooks...");

        for hook in &self.hooks {
            tracing::debug!(hook = hook.name(), "after_start");
            let outcome = hook.after_start(app).await;
            self.record(Phase::AfterStart, hook.as_ref(), outcome.is_ok());
            outcome.map_err(|e| {
                tracing::error!(hook = hook.name(), error = %e, "after_start failed");
                SuiteError::hook_failed(hook.name(), Phase::AfterStart, e)
            })?;
        }

        tracing::info!("after_start complete ({} hooks executed)", self.hooks.len());
        Ok(())
    }

    pub async fn run_before_tests(&self) -> Result<()> {
        self.run_forward(Phase::BeforeTests).await
    }

    pub async fn run_before_each_test(&self) -> Result<()> {
        self.run_forward(Phase::BeforeEachTest).await
    }

    pub async fn run_after_tests(&self) -> Result<()> {
        self.run_teardown(Phase::AfterTests).await
    }

    pub async fn run_after_each_test(&self) -> Result<()> {
        self.run_teardown(Phase::AfterEachTest).await
    }

    async fn run_forward(&self, phase: Phase) -> Result<()> {
        tracing::info!("Running {} hooks...", phase);

        for hook in &self.hooks {
            tracing::debug!(hook = hook.name(), "{}", phase);
            let outcome = dispatch(hook.as_ref(), phase).await;
            self.record(phase, hook.as_ref(), outcome.is_ok());
            outcome.map_err(|e| {
                tracing::error!(hook = hook.name(), error = %e, "{} failed", phase);
                SuiteError::hook_failed(hook.name(), phase, e)
            })?;
        }

        tracing::info!("{} complete ({} hooks executed)", phase, self.hooks.len());
        Ok(())
    }

    async fn run_teardown(&self, phase: Phase) -> Result<()> {
        tracing::info!("Running {} hooks...", phase);
        let mut first_failure = None;

        // Execute in reverse order
        for hook in self.hooks.iter().rev() {
            tracing::debug!(hook = hook.name(), "{}", phase);
            let outcome = dispatch(hook.as_ref(), phase).await;
            self.record(phase, hook.as_ref(), outcome.is_ok());
            if let Err(e) = outcome {
                // Log error but continue with other hooks
                tracing::error!(hook = hook.name(), error = %e, "{} failed", phase);
                first_failure.get_or_insert_with(|| SuiteError::hook_failed(hook.name(), phase, e));
            }
        }

        tracing::info!("{} complete ({} hooks executed)", phase, self.hooks.len());
        first_failure.map_or(Ok(()), Err)
    }

    fn record(&self, phase: Phase, hook: &dyn Hook, succeeded: bool) {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HookExecution {
                phase,
                hook: hook.name().to_string(),
                succeeded,
                at: Utc::now(),
            });
    }
}

async fn dispatch(hook: &dyn Hook, phase: Phase) -> Result<()> {
    match phase {
        Phase::BeforeTests => hook.before_tests().await,
        Phase::BeforeEachTest => hook.before_each_test().await,
        Phase::AfterEachTest => hook.after_each_test().await,
        Phase::AfterTests => hook.after_tests().await,
        Phase::BeforeStart | Phase::AfterStart => Err(SuiteError::Internal(format!(
            "{phase} is not a parameterless phase"
        ))),
    }
}

//! Hooks
//!
//! A hook is a composable unit of test-time behavior. It has a priority,
//! keeps whatever private state it needs between its own phase calls, and
//! overrides any of the six lifecycle callbacks.

mod fn_hook;
mod manager;
mod state;

pub use fn_hook::{FnHook, FnHookBuilder};
pub use manager::{HookExecution, HookManager};
pub use state::HookState;

use crate::app::AppView;
use crate::config::BootConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Lifecycle phase a hook callback belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeStart,
    AfterStart,
    BeforeTests,
    BeforeEachTest,
    AfterEachTest,
    AfterTests,
}

impl Phase {
    /// Teardown phases run hooks in reverse priority order
    pub fn is_teardown(self) -> bool {
        matches!(self, Phase::AfterEachTest | Phase::AfterTests)
    }
}

/// Unit of test-time behavior driven by the [`HookManager`]
///
/// Every callback is a no-op by default. Lower priorities run first in
/// forward phases and last in teardown phases.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Contribute to the boot configuration
    ///
    /// Receives the accumulator built by every hook that ran before this
    /// one and returns it, possibly extended, to the next stage.
    async fn before_start(&self, config: BootConfig) -> Result<BootConfig> {
        Ok(config)
    }

    async fn after_start(&self, _app: &AppView) -> Result<()> {
        Ok(())
    }

    async fn before_tests(&self) -> Result<()> {
        Ok(())
    }

    async fn after_tests(&self) -> Result<()> {
        Ok(())
    }

    async fn before_each_test(&self) -> Result<()> {
        Ok(())
    }

    async fn after_each_test(&self) -> Result<()> {
        Ok(())
    }
}

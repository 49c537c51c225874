use crate::error::{Result, SuiteError};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of one suite
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::FromRepr,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SuiteState {
    Uninitialized,
    /// The setup callback is running; setup entries are open
    Configuring,
    Starting,
    Running,
    Stopping,
    Stopped,
    EmergencyCleanup,
}

/// Shared, atomically updated suite state
///
/// The framework drives it; hook entry points consult it to reject calls
/// made outside their window.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SuiteState::Uninitialized as u8)))
    }

    pub fn get(&self) -> SuiteState {
        SuiteState::from_repr(self.0.load(Ordering::Acquire)).unwrap_or(SuiteState::Uninitialized)
    }

    pub fn set(&self, state: SuiteState) {
        let previous = self.0.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            tracing::debug!(
                from = %SuiteState::from_repr(previous).unwrap_or(SuiteState::Uninitialized),
                to = %state,
                "Suite state changed"
            );
        }
    }

    /// Fail unless the setup callback is running
    pub fn ensure_setup(&self, entry: &str) -> Result<()> {
        match self.get() {
            SuiteState::Configuring => Ok(()),
            state => Err(SuiteError::SetupClosed {
                entry: entry.to_string(),
                state,
            }),
        }
    }

    /// Fail unless the suite has booted and not begun stopping
    pub fn ensure_running(&self, entry: &str) -> Result<()> {
        match self.get() {
            SuiteState::Running => Ok(()),
            state => Err(SuiteError::NotReady {
                entry: entry.to_string(),
                state,
            }),
        }
    }
}

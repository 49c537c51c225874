use super::SuiteState;
use crate::app::ResourceInfo;
use crate::hook::{HookExecution, Phase};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// How a teardown step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed { error: String },
    Skipped { reason: String },
}

/// One attempted teardown step
#[derive(Debug, Clone, Serialize)]
pub struct CleanupEntry {
    pub step: String,
    pub outcome: StepOutcome,
    pub at: DateTime<Utc>,
}

/// Ordered audit trail of teardown steps
#[derive(Debug, Default)]
pub struct CleanupLog {
    entries: Mutex<Vec<CleanupEntry>>,
}

impl CleanupLog {
    pub fn record(&self, step: &str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Completed => tracing::debug!(step, "Teardown step completed"),
            StepOutcome::Failed { error } => tracing::error!(step, %error, "Teardown step failed"),
            StepOutcome::Skipped { reason } => tracing::debug!(step, %reason, "Teardown step skipped"),
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CleanupEntry {
                step: step.to_string(),
                outcome,
                at: Utc::now(),
            });
    }

    pub fn entries(&self) -> Vec<CleanupEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries recorded after the first `start`
    pub fn since(&self, start: usize) -> Vec<CleanupEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .skip(start)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// A panic outside any test body
    Panic,
    /// SIGINT or SIGTERM
    Signal,
    /// Reported directly by the caller
    Reported,
}

/// A process-level fatal error that triggered emergency cleanup
#[derive(Debug, Clone, Serialize)]
pub struct FatalError {
    pub kind: FatalKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FatalError {
    pub fn new(kind: FatalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(FatalKind::Panic, message)
    }

    pub fn signal(name: impl Into<String>) -> Self {
        Self::new(FatalKind::Signal, name)
    }

    pub fn reported(message: impl Into<String>) -> Self {
        Self::new(FatalKind::Reported, message)
    }
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// What an emergency cleanup did
#[derive(Debug, Clone, Serialize)]
pub struct EmergencySummary {
    pub suite: Uuid,
    pub error: FatalError,
    /// `true` when cleanup had already been initiated and nothing ran
    pub skipped: bool,
    pub previous_state: SuiteState,
    pub phases: Vec<Phase>,
    pub steps: Vec<CleanupEntry>,
    pub executions: Vec<HookExecution>,
    pub lingering: Vec<ResourceInfo>,
}

impl EmergencySummary {
    pub(crate) fn skipped(suite: Uuid, error: FatalError, state: SuiteState) -> Self {
        Self {
            suite,
            error,
            skipped: true,
            previous_state: state,
            phases: Vec::new(),
            steps: Vec::new(),
            executions: Vec::new(),
            lingering: Vec::new(),
        }
    }
}

use crate::framework::SuiteState;
use crate::hook::Phase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuiteError>;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("{type_name} is a {kind} and cannot be instrumented with {capability}")]
    NotInstrumentable {
        type_name: String,
        kind: String,
        capability: String,
    },

    #[error("{type_name} has no instrumentable method `{method}`")]
    UnknownMethod { type_name: String, method: String },

    #[error("Signature mismatch for {type_name}::{method}: {message}")]
    SignatureMismatch {
        type_name: String,
        method: String,
        message: String,
    },

    #[error("{type_name}::{method} is already instrumented; restore it before instrumenting again")]
    AlreadyInstrumented { type_name: String, method: String },

    #[error("Setup entry `{entry}` can only be called from the setup callback (suite is {state})")]
    SetupClosed { entry: String, state: SuiteState },

    #[error("Return entry `{entry}` is only available while the suite is running (suite is {state})")]
    NotReady { entry: String, state: SuiteState },

    #[error("Hook `{hook}` has no {resource} yet")]
    ResourceUnavailable { hook: String, resource: String },

    #[error("Hook `{hook}` was registered without any lifecycle callback")]
    EmptyHook { hook: String },

    #[error("Entry `{name}` of hook `{hook}` collides with the entry of hook `{existing}`")]
    DuplicateEntry {
        name: String,
        existing: String,
        hook: String,
    },

    #[error("No hook entry named `{name}`")]
    UnknownEntry { name: String },

    #[error("Hook entry `{name}` is not a {expected}")]
    EntryTypeMismatch { name: String, expected: String },

    #[error("Hook `{hook}` failed during {phase}: {source}")]
    HookFailed {
        hook: String,
        phase: Phase,
        #[source]
        source: Box<SuiteError>,
    },

    #[error("Application boot failed: {message}")]
    BootFailed { message: String },

    #[error("Readiness signal `{event}` failed: {message}")]
    Readiness { event: String, message: String },

    #[error("Phase `{phase}` was interrupted by emergency cleanup")]
    Interrupted { phase: String },

    #[error("Invalid boot configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SuiteError {
    pub fn boot_failed(message: impl Into<String>) -> Self {
        Self::BootFailed {
            message: message.into(),
        }
    }

    pub fn resource_unavailable(hook: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            hook: hook.into(),
            resource: resource.into(),
        }
    }

    pub fn hook_failed(hook: impl Into<String>, phase: Phase, source: SuiteError) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            phase,
            source: Box::new(source),
        }
    }
}

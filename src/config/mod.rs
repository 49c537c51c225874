//! Harness configuration
//!
//! Two kinds of configuration live here: the [`BootConfig`] accumulator that
//! hooks build up for the application under test, and the
//! [`HarnessSettings`] that tune the harness itself.

mod boot;

pub use boot::BootConfig;

use dashmap::DashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::time::Duration;

pub const LINGERING_ENV: &str = "SUITEKIT_LINGERING";
pub const READINESS_TIMEOUT_ENV: &str = "SUITEKIT_READINESS_TIMEOUT_MS";
pub const EMERGENCY_TIMEOUT_ENV: &str = "SUITEKIT_EMERGENCY_TIMEOUT_MS";

const DEFAULT_EMERGENCY_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot of environment variables
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    vars: Arc<DashMap<OsString, OsString>>,
}

impl EnvSnapshot {
    /// Capture the current process environment, non-unicode entries included
    pub fn capture() -> Self {
        let snapshot = Self::default();
        for (key, value) in env::vars_os() {
            snapshot.vars.insert(key, value);
        }
        snapshot
    }

    /// Unicode value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(OsStr::new(key))
            .and_then(|value| value.to_str().map(str::to_owned))
    }

    pub fn get_os(&self, key: &OsStr) -> Option<OsString> {
        self.vars.get(key).map(|value| value.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contains_os(OsStr::new(key))
    }

    pub fn contains_os(&self, key: &OsStr) -> bool {
        self.vars.contains_key(key)
    }

    /// Every captured variable, in no particular order
    pub fn vars(&self) -> Vec<(OsString, OsString)> {
        self.vars
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn millis(&self, key: &str) -> Option<Duration> {
        let raw = self.get(key)?;
        match raw.trim().parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring non-numeric duration setting");
                None
            }
        }
    }
}

/// What to do when resource handles are still alive after teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LingeringPolicy {
    /// Log the lingering handles and return normally
    Warn,
    /// Log the lingering handles, then end the process with exit code 0
    Exit,
}

/// Settings for the harness itself
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub lingering_policy: LingeringPolicy,
    /// Upper bound on waiting for readiness signals; `None` waits indefinitely
    pub readiness_timeout: Option<Duration>,
    /// Upper bound on out-of-band emergency cleanup
    pub emergency_timeout: Duration,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            lingering_policy: LingeringPolicy::Warn,
            readiness_timeout: None,
            emergency_timeout: DEFAULT_EMERGENCY_TIMEOUT,
        }
    }
}

impl HarnessSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub fn from_snapshot(env: &EnvSnapshot) -> Self {
        let lingering_policy = match env.get(LINGERING_ENV).as_deref().map(str::trim) {
            Some("exit") => LingeringPolicy::Exit,
            Some("warn") => LingeringPolicy::Warn,
            Some(other) => {
                tracing::warn!(value = other, "Unknown {LINGERING_ENV} value, falling back to default");
                Self::default_lingering(env)
            }
            None => Self::default_lingering(env),
        };

        Self {
            lingering_policy,
            readiness_timeout: env.millis(READINESS_TIMEOUT_ENV),
            emergency_timeout: env
                .millis(EMERGENCY_TIMEOUT_ENV)
                .unwrap_or(DEFAULT_EMERGENCY_TIMEOUT),
        }
    }

    // CI runs must not hang on a handle nobody can reach.
    fn default_lingering(env: &EnvSnapshot) -> LingeringPolicy {
        if env.contains("CI") {
            LingeringPolicy::Exit
        } else {
            LingeringPolicy::Warn
        }
    }

    pub fn lingering_policy(mut self, policy: LingeringPolicy) -> Self {
        self.lingering_policy = policy;
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn emergency_timeout(mut self, timeout: Duration) -> Self {
        self.emergency_timeout = timeout;
        self
    }
}

use super::report::{EmergencySummary, FatalError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use uuid::Uuid;

/// A suite that can be torn down out of band
#[async_trait]
pub trait EmergencyCleanup: Send + Sync {
    fn suite_id(&self) -> Uuid;

    async fn emergency_cleanup(&self, error: FatalError) -> EmergencySummary;
}

struct Registered {
    suite: Weak<dyn EmergencyCleanup>,
    // Thread that created the suite; a panic there outside a test body ends it.
    owner: ThreadId,
}

/// Registry of live suites reachable from fatal-error listeners
///
/// Suites register on creation and deregister when dropped. Entries are
/// weak, so the registry never keeps a finished suite alive.
#[derive(Clone, Default)]
pub struct SuiteRegistry {
    suites: Arc<DashMap<Uuid, Registered>>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: EmergencyCleanup + 'static>(&self, suite: &Arc<S>) {
        let suite: Arc<dyn EmergencyCleanup> = suite.clone();
        tracing::debug!(suite = %suite.suite_id(), "Suite registered");
        self.suites.insert(
            suite.suite_id(),
            Registered {
                suite: Arc::downgrade(&suite),
                owner: thread::current().id(),
            },
        );
    }

    pub fn deregister(&self, id: Uuid) -> bool {
        let removed = self.suites.remove(&id).is_some();
        if removed {
            tracing::debug!(suite = %id, "Suite deregistered");
        }
        removed
    }

    /// Suites still alive; entries for dropped suites are pruned
    pub fn live(&self) -> Vec<Arc<dyn EmergencyCleanup>> {
        self.suites.retain(|_, entry| entry.suite.strong_count() > 0);
        self.suites
            .iter()
            .filter_map(|entry| entry.suite.upgrade())
            .collect()
    }

    /// Live suites created on `thread`
    pub fn owned_by(&self, thread: ThreadId) -> Vec<Arc<dyn EmergencyCleanup>> {
        self.suites
            .iter()
            .filter(|entry| entry.owner == thread)
            .filter_map(|entry| entry.suite.upgrade())
            .collect()
    }

    pub(crate) fn same_as(&self, other: &SuiteRegistry) -> bool {
        Arc::ptr_eq(&self.suites, &other.suites)
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run emergency cleanup on every live suite, one after another
    pub async fn cleanup_all(&self, error: FatalError) -> Vec<EmergencySummary> {
        cleanup_suites(self.live(), error).await
    }
}

pub(crate) async fn cleanup_suites(
    suites: Vec<Arc<dyn EmergencyCleanup>>,
    error: FatalError,
) -> Vec<EmergencySummary> {
    tracing::error!(
        kind = %error.kind,
        message = %error.message,
        suites = suites.len(),
        "Fatal error, running emergency cleanup"
    );

    let mut summaries = Vec::with_capacity(suites.len());
    for suite in suites {
        summaries.push(suite.emergency_cleanup(error.clone()).await);
    }
    summaries
}

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Kind of a tracked resource handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Listener,
    Task,
    Timer,
    Pool,
    Other,
}

/// A live resource handle
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub id: u64,
    pub kind: ResourceKind,
    pub label: String,
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    live: DashMap<u64, ResourceInfo>,
}

/// Registry of resource handles the application under test keeps open
///
/// A resource stays registered for as long as its [`ResourceGuard`] lives.
/// After teardown the harness inspects what is left to find handles that
/// would keep the process alive.
#[derive(Clone, Default)]
pub struct ResourceTracker {
    registry: Arc<Registry>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, kind: ResourceKind, label: impl Into<String>) -> ResourceGuard {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let info = ResourceInfo {
            id,
            kind,
            label: label.into(),
            since: Utc::now(),
        };
        tracing::trace!(id, kind = %info.kind, label = %info.label, "Tracking resource");
        self.registry.live.insert(id, info);
        ResourceGuard {
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Spawn a task that stays tracked until it finishes or is aborted
    pub fn spawn<F>(&self, label: impl Into<String>, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track(ResourceKind::Task, label);
        tokio::spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Resources still alive, oldest first
    pub fn live(&self) -> Vec<ResourceInfo> {
        let mut live: Vec<ResourceInfo> = self
            .registry
            .live
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        live.sort_by_key(|info| info.id);
        live
    }

    pub fn live_count(&self) -> usize {
        self.registry.live.len()
    }
}

/// Keeps a resource registered until dropped
pub struct ResourceGuard {
    id: u64,
    registry: Arc<Registry>,
}

impl ResourceGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.registry.live.remove(&self.id);
    }
}

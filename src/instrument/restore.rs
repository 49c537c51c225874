use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type RestoreFn = Box<dyn FnOnce() + Send>;

/// A pending restoration of instrumented methods
///
/// Clones share the same action, which runs at most once no matter how many
/// holders call [`Restoration::restore`].
#[derive(Clone)]
pub struct Restoration {
    label: Arc<str>,
    action: Arc<Mutex<Option<RestoreFn>>>,
}

impl Restoration {
    pub(crate) fn new(label: impl Into<String>, action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: Arc::from(label.into()),
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// Run the restoration; returns `false` if it had already run
    pub fn restore(&self) -> bool {
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match action {
            Some(action) => {
                action();
                tracing::debug!(instrumentation = %self.label, "Restored");
                true
            }
            None => false,
        }
    }

    pub fn is_restored(&self) -> bool {
        self.action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Restoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Restoration")
            .field("label", &self.label)
            .field("restored", &self.is_restored())
            .finish()
    }
}

/// Queue of restorations swept during teardown
#[derive(Default)]
pub struct RestoreQueue {
    pending: Mutex<Vec<Restoration>>,
}

impl RestoreQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, restoration: Restoration) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(restoration);
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every queued restoration, newest first
    ///
    /// Returns how many were still outstanding; ones already restored by
    /// their handle are skipped.
    pub fn sweep(&self) -> usize {
        let pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        pending
            .iter()
            .rev()
            .filter(|restoration| restoration.restore())
            .count()
    }
}

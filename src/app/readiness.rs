use crate::error::{Result, SuiteError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Storage and persistence initialization finished
pub const PERSISTENCE_READY: &str = "persistence_ready";
/// Post-construction and adapter wiring finished
pub const WIRING_COMPLETE: &str = "wiring_complete";

/// Events the harness waits for before running any test
pub const REQUIRED_SIGNALS: [&str; 2] = [PERSISTENCE_READY, WIRING_COMPLETE];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Pending,
    Ready,
    Failed(String),
}

/// Named lifecycle-readiness events raised by the application under test
///
/// A waiter registered before or after the event fires both see it.
#[derive(Clone, Default)]
pub struct Readiness {
    events: Arc<DashMap<String, watch::Sender<Signal>>>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, event: &str) -> watch::Sender<Signal> {
        self.events
            .entry(event.to_string())
            .or_insert_with(|| watch::channel(Signal::Pending).0)
            .clone()
    }

    /// Mark `event` as reached
    pub fn signal(&self, event: &str) {
        tracing::debug!(event, "Readiness signalled");
        self.channel(event).send_replace(Signal::Ready);
    }

    /// Mark `event` as failed; waiters get an error carrying `message`
    pub fn fail(&self, event: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(event, %message, "Readiness failed");
        self.channel(event).send_replace(Signal::Failed(message));
    }

    pub fn is_ready(&self, event: &str) -> bool {
        self.events
            .get(event)
            .is_some_and(|sender| *sender.borrow() == Signal::Ready)
    }

    /// Wait until `event` is signalled or failed
    pub async fn wait(&self, event: &str) -> Result<()> {
        let mut receiver = self.channel(event).subscribe();
        let settled = receiver
            .wait_for(|signal| *signal != Signal::Pending)
            .await
            .map_err(|_| SuiteError::Readiness {
                event: event.to_string(),
                message: "signal source dropped".to_string(),
            })?
            .clone();

        match settled {
            Signal::Failed(message) => Err(SuiteError::Readiness {
                event: event.to_string(),
                message,
            }),
            _ => Ok(()),
        }
    }

    /// Wait for every event in `events`, in order
    pub async fn wait_all(&self, events: &[&str]) -> Result<()> {
        for event in events {
            self.wait(event).await?;
        }
        Ok(())
    }
}

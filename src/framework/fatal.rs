//! Fatal-error listeners
//!
//! Routes termination signals to the emergency cleanup of every live suite,
//! and panics to the suites owned by the panicking thread.
//!
//! A panic escalates only when it is going to end the thread that created
//! the suite: panics inside test bodies are resumed by the runner, panics in
//! tokio tasks come back as `JoinError`s, and panics on other threads only
//! end those threads.

use super::registry::{cleanup_suites, EmergencyCleanup, SuiteRegistry};
use super::report::FatalError;
use std::cell::Cell;
use std::future::Future;
use std::panic::PanicHookInfo;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::signal;

/// Exit code used after cleaning up on SIGINT/SIGTERM
pub const SIGNAL_EXIT_CODE: i32 = 130;

static INSTALLED: AtomicBool = AtomicBool::new(false);

// Every registry handed to `install_fatal_listeners`.
static LISTENED: Mutex<Vec<SuiteRegistry>> = Mutex::new(Vec::new());

thread_local! {
    static GUARDED_DEPTH: Cell<u32> = const { Cell::new(0) };
}

fn in_guarded_body() -> bool {
    GUARDED_DEPTH.with(|depth| depth.get() > 0)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        GUARDED_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        GUARDED_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// A test body; panics raised while it is polled belong to the test, not the process
pub struct GuardedBody<F> {
    inner: Pin<Box<F>>,
}

/// Mark `body` as a test body
pub fn guarded<F: Future>(body: F) -> GuardedBody<F> {
    GuardedBody {
        inner: Box::pin(body),
    }
}

impl<F: Future> Future for GuardedBody<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _depth = DepthGuard::enter();
        self.inner.as_mut().poll(cx)
    }
}

/// Install the process-wide fatal-error listeners and make `registry` reachable from them
///
/// Only the first call in a process installs the listeners and returns
/// `true`; every call adds its registry. Cleanup triggered by a listener is
/// bounded by the `timeout` of the first call.
pub fn install_fatal_listeners(registry: &SuiteRegistry, timeout: Duration) -> bool {
    {
        let mut listened = LISTENED.lock().unwrap_or_else(PoisonError::into_inner);
        if !listened.iter().any(|known| known.same_as(registry)) {
            listened.push(registry.clone());
        }
    }

    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    install_panic_hook(timeout);
    spawn_signal_listener(timeout);
    tracing::debug!("Fatal-error listeners installed");
    true
}

fn listened_suites<F>(select: F) -> Vec<Arc<dyn EmergencyCleanup>>
where
    F: Fn(&SuiteRegistry) -> Vec<Arc<dyn EmergencyCleanup>>,
{
    LISTENED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .flat_map(&select)
        .collect()
}

/// Whether a panic raised here unwinds past everything that could catch it
fn escalates() -> bool {
    !in_guarded_body() && tokio::task::try_id().is_none()
}

fn install_panic_hook(timeout: Duration) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        if !escalates() {
            return;
        }

        let thread = std::thread::current().id();
        // Upgraded now; the suites are dropped while this thread unwinds.
        let suites = listened_suites(|registry| registry.owned_by(thread));
        if suites.is_empty() {
            return;
        }

        let error = FatalError::panic(panic_message(info));
        let spawned = std::thread::Builder::new()
            .name("suitekit-emergency".into())
            .spawn(move || run_cleanup(suites, error, timeout));
        if let Err(e) = spawned {
            tracing::error!(error = %e, "Could not start emergency cleanup thread");
        }
    }));
}

fn spawn_signal_listener(timeout: Duration) {
    let spawned = std::thread::Builder::new()
        .name("suitekit-signals".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "Could not start signal listener runtime");
                    return;
                }
            };
            runtime.block_on(async move {
                let name = shutdown_signal().await;
                let suites = listened_suites(SuiteRegistry::live);
                cleanup_bounded(suites, FatalError::signal(name), timeout).await;
                std::process::exit(SIGNAL_EXIT_CODE);
            });
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "Could not start signal listener thread");
    }
}

fn run_cleanup(suites: Vec<Arc<dyn EmergencyCleanup>>, error: FatalError, timeout: Duration) {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(cleanup_bounded(suites, error, timeout)),
        Err(e) => tracing::error!(error = %e, "Could not start emergency cleanup runtime"),
    }
}

async fn cleanup_bounded(suites: Vec<Arc<dyn EmergencyCleanup>>, error: FatalError, timeout: Duration) {
    match tokio::time::timeout(timeout, cleanup_suites(suites, error)).await {
        Ok(summaries) => {
            for summary in summaries {
                match serde_json::to_string(&summary) {
                    Ok(json) => tracing::error!(summary = %json, "Emergency cleanup finished"),
                    Err(e) => tracing::error!(error = %e, "Emergency cleanup finished"),
                }
            }
        }
        Err(_) => tracing::error!(?timeout, "Emergency cleanup timed out"),
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    match info.location() {
        Some(location) => format!("{payload} at {location}"),
        None => payload,
    }
}

/// Resolve when SIGINT or SIGTERM arrives; yields the signal name
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
            "SIGINT"
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
            "SIGTERM"
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_is_scoped_to_polls() {
        assert!(!in_guarded_body());
        let inside = guarded(async {
            tokio::task::yield_now().await;
            in_guarded_body()
        })
        .await;
        assert!(inside);
        assert!(!in_guarded_body());
    }

    #[tokio::test]
    async fn test_only_uncaught_panics_escalate() {
        assert!(escalates());
        assert!(!guarded(async { escalates() }).await);

        let in_task = tokio::spawn(async { escalates() }).await.unwrap();
        assert!(!in_task);
    }

    #[test]
    fn test_every_registry_is_listened() {
        let first = SuiteRegistry::new();
        let second = SuiteRegistry::new();
        install_fatal_listeners(&first, Duration::from_secs(1));
        install_fatal_listeners(&second, Duration::from_secs(1));
        install_fatal_listeners(&second, Duration::from_secs(1));

        let listened = LISTENED.lock().unwrap();
        assert_eq!(listened.iter().filter(|known| known.same_as(&first)).count(), 1);
        assert_eq!(listened.iter().filter(|known| known.same_as(&second)).count(), 1);
    }
}

//! Test Framework
//!
//! One [`TestFramework`] drives one suite: it boots exactly one application,
//! runs the hook phases around it, and tears everything down again, either
//! at suite end or out of band from a fatal-error listener.

pub mod fatal;
mod registry;
mod report;
mod state;

pub use fatal::{install_fatal_listeners, shutdown_signal};
pub use registry::{EmergencyCleanup, SuiteRegistry};
pub use report::{CleanupEntry, CleanupLog, EmergencySummary, FatalError, FatalKind, StepOutcome};
pub use state::{StateCell, SuiteState};

use crate::app::{AppView, Application, BootContext, Readiness, ResourceInfo, ResourceTracker, REQUIRED_SIGNALS};
use crate::config::{HarnessSettings, LingeringPolicy};
use crate::error::{Result, SuiteError};
use crate::hook::{HookExecution, HookManager, Phase};
use crate::library::{DefaultHooksLibrary, HooksLibrary, ReturnHooks, SetupHooks};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as PhaseLock;
use tokio::sync::watch;
use uuid::Uuid;

// Time given to tasks that are already shutting down before handles count as lingering.
const SETTLE_ATTEMPTS: u32 = 20;
const SETTLE_INTERVAL: Duration = Duration::from_millis(10);

/// Per-suite orchestrator
///
/// ```text
/// Uninitialized -> Configuring -> Starting -> Running -> Stopping -> Stopped
///                                     \          \
///                                      +----------+--> EmergencyCleanup -> Stopped
/// ```
///
/// # Example
///
/// ```rust,ignore
/// let framework = TestFramework::builder(MyApi::new())
///     .settings(HarnessSettings::from_env())
///     .build()?;
///
/// framework
///     .run_before_all(|setup| setup.config(json!({ "port": 0 })))
///     .await?;
///
/// framework.run_before_each_test().await?;
/// let users = framework.return_hooks().get::<UserService>()?;
/// // ... assertions ...
/// framework.run_after_each_test().await?;
///
/// framework.run_after_all().await;
/// ```
pub struct TestFramework<L: HooksLibrary = DefaultHooksLibrary> {
    id: Uuid,
    application: Arc<dyn Application>,
    library: Arc<L>,
    settings: HarnessSettings,
    state: StateCell,
    // Held for the whole of every phase so no two phases overlap.
    manager: PhaseLock<HookManager>,
    setup_hooks: SetupHooks,
    return_hooks: ReturnHooks,
    app_view: Mutex<Option<AppView>>,
    resources: ResourceTracker,
    readiness: Readiness,
    has_run_before_all: AtomicBool,
    has_run_after_all: AtomicBool,
    in_test: AtomicBool,
    emergency_initiated: AtomicBool,
    // Flipped by emergency cleanup so an in-flight phase lets go of the phase lock.
    aborted: watch::Sender<bool>,
    cleanup_log: CleanupLog,
    fatal_events: Mutex<Vec<FatalError>>,
}

impl TestFramework {
    /// Start building a framework with the built-in hooks
    pub fn builder<A: Application + 'static>(application: A) -> TestFrameworkBuilder<DefaultHooksLibrary> {
        TestFrameworkBuilder {
            application: Arc::new(application),
            library: DefaultHooksLibrary::new(),
            settings: None,
        }
    }
}

/// Builder for [`TestFramework`]
pub struct TestFrameworkBuilder<L> {
    application: Arc<dyn Application>,
    library: L,
    settings: Option<HarnessSettings>,
}

impl<L: HooksLibrary> TestFrameworkBuilder<L> {
    /// Use another hooks library
    pub fn library<M: HooksLibrary>(self, library: M) -> TestFrameworkBuilder<M> {
        TestFrameworkBuilder {
            application: self.application,
            library,
            settings: self.settings,
        }
    }

    /// Harness settings; defaults to [`HarnessSettings::from_env`]
    pub fn settings(mut self, settings: HarnessSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<TestFramework<L>> {
        let library = Arc::new(self.library);
        let mut manager = HookManager::new();
        library.register_hooks(&mut manager);
        let setup_hooks = library.setup_hooks()?;
        let return_hooks = library.return_hooks()?;

        let id = Uuid::new_v4();
        tracing::debug!(suite = %id, hooks = ?manager.hook_names(), "Test framework created");

        Ok(TestFramework {
            id,
            application: self.application,
            state: library.state(),
            library,
            settings: self.settings.unwrap_or_else(HarnessSettings::from_env),
            manager: PhaseLock::new(manager),
            setup_hooks,
            return_hooks,
            app_view: Mutex::new(None),
            resources: ResourceTracker::new(),
            readiness: Readiness::new(),
            has_run_before_all: AtomicBool::new(false),
            has_run_after_all: AtomicBool::new(false),
            in_test: AtomicBool::new(false),
            emergency_initiated: AtomicBool::new(false),
            aborted: watch::channel(false).0,
            cleanup_log: CleanupLog::default(),
            fatal_events: Mutex::new(Vec::new()),
        })
    }
}

impl<L: HooksLibrary> TestFramework<L> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SuiteState {
        self.state.get()
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn library(&self) -> &Arc<L> {
        &self.library
    }

    /// Entries for test bodies
    pub fn return_hooks(&self) -> ReturnHooks {
        self.return_hooks.clone()
    }

    /// The booted application, if boot got that far and teardown has not run
    pub fn app_view(&self) -> Option<AppView> {
        self.app_view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tracker the application registers its handles with
    pub fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    pub fn in_test(&self) -> bool {
        self.in_test.load(Ordering::SeqCst)
    }

    /// Audit trail of teardown steps
    pub fn cleanup_log(&self) -> Vec<CleanupEntry> {
        self.cleanup_log.entries()
    }

    /// Fatal errors recorded by emergency cleanup
    pub fn fatal_events(&self) -> Vec<FatalError> {
        self.fatal_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every hook callback run so far
    pub async fn executions(&self) -> Vec<HookExecution> {
        self.manager.lock().await.executions()
    }

    /// Resource handles that are still alive
    pub fn lingering(&self) -> Vec<ResourceInfo> {
        self.resources.live()
    }

    /// Configure, boot and prepare the suite
    ///
    /// `setup` is the only place setup entries may be called. Runs once;
    /// later calls return immediately. A failure leaves the suite in
    /// `Configuring` or `Starting`; [`TestFramework::run_after_all`] stays safe to call.
    pub async fn run_before_all<F>(&self, setup: F) -> Result<()>
    where
        F: FnOnce(&SetupHooks) -> Result<()>,
    {
        if self.has_run_before_all.swap(true, Ordering::SeqCst) {
            tracing::debug!(suite = %self.id, "before_all already ran");
            return Ok(());
        }

        let mut manager = self.manager.lock().await;
        tracing::info!(suite = %self.id, "Starting suite...");

        tokio::select! {
            booted = self.boot(&mut manager, setup) => booted,
            () = self.until_aborted() => Err(self.interrupted("before_all")),
        }
    }

    async fn boot<F>(&self, manager: &mut HookManager, setup: F) -> Result<()>
    where
        F: FnOnce(&SetupHooks) -> Result<()>,
    {
        self.state.set(SuiteState::Configuring);
        let configured = setup(&self.setup_hooks);
        self.state.set(SuiteState::Starting);
        configured.inspect_err(|e| tracing::error!(error = %e, "Setup callback failed"))?;

        let config = manager.run_before_start().await?;
        let ctx = BootContext::new(config, self.resources.clone(), self.readiness.clone());
        let view = self
            .application
            .start(ctx)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Application failed to boot"))?;
        *self.app_view.lock().unwrap_or_else(PoisonError::into_inner) = Some(view.clone());

        self.await_readiness().await?;
        // Let tasks woken by the readiness signals run before the first test.
        tokio::task::yield_now().await;

        manager.run_after_start(&view).await?;
        manager.run_before_tests().await?;

        self.state.set(SuiteState::Running);
        tracing::info!(suite = %self.id, listener = ?view.listener_addr(), "Suite running");
        Ok(())
    }

    /// Resolves once emergency cleanup has started
    async fn until_aborted(&self) {
        let mut aborted = self.aborted.subscribe();
        let _ = aborted.wait_for(|aborted| *aborted).await;
    }

    fn interrupted(&self, phase: &str) -> SuiteError {
        tracing::warn!(suite = %self.id, phase, "Phase interrupted by emergency cleanup");
        SuiteError::Interrupted {
            phase: phase.to_string(),
        }
    }

    async fn await_readiness(&self) -> Result<()> {
        let waiting = self.readiness.wait_all(&REQUIRED_SIGNALS);
        match self.settings.readiness_timeout {
            Some(timeout) => tokio::time::timeout(timeout, waiting)
                .await
                .map_err(|_| SuiteError::Readiness {
                    event: REQUIRED_SIGNALS.join(", "),
                    message: format!("Timeout after {:?}", timeout),
                })?,
            None => waiting.await,
        }
    }

    pub async fn run_before_each_test(&self) -> Result<()> {
        let manager = self.manager.lock().await;
        self.in_test.store(true, Ordering::SeqCst);
        tokio::select! {
            prepared = manager.run_before_each_test() => prepared,
            () = self.until_aborted() => Err(self.interrupted("before_each_test")),
        }
    }

    pub async fn run_after_each_test(&self) -> Result<()> {
        let manager = self.manager.lock().await;
        let result = manager.run_after_each_test().await;
        self.in_test.store(false, Ordering::SeqCst);
        result
    }

    /// Tear the suite down
    ///
    /// Runs once; later calls are no-ops. Every step is attempted even if
    /// an earlier one failed, and failures are only logged. Handles still
    /// alive afterwards are reported according to the lingering policy.
    pub async fn run_after_all(&self) {
        if self.has_run_after_all.swap(true, Ordering::SeqCst) {
            tracing::debug!(suite = %self.id, "after_all already ran");
            return;
        }

        let manager = self.manager.lock().await;
        tracing::info!(suite = %self.id, "Stopping suite...");
        if self.state.get() != SuiteState::EmergencyCleanup {
            self.state.set(SuiteState::Stopping);
        }

        let hooks = manager.run_after_tests().await;
        self.record_step("after_tests hooks", hooks);

        let view = self
            .app_view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match view {
            Some(view) => self.release_application(view).await,
            None => {
                for step in ["close listener", "reset container", "close persistence"] {
                    self.skip_step(step, "application never booted");
                }
            }
        }

        self.state.set(SuiteState::Stopped);
        drop(manager);

        self.check_lingering().await;
        tracing::info!(suite = %self.id, "Suite stopped");
    }

    async fn release_application(&self, view: AppView) {
        match view.take_listener() {
            Some(listener) => {
                let closed = listener.close().await;
                self.record_step("close listener", closed);
            }
            None => self.skip_step("close listener", "no listener"),
        }

        view.container().reset();
        self.record_step("reset container", Ok(()));

        match view.persistence() {
            Some(pool) => {
                let closed = pool.close().await;
                self.record_step("close persistence", closed);
            }
            None => self.skip_step("close persistence", "no persistence pool"),
        }
    }

    fn record_step(&self, step: &str, result: Result<()>) {
        let outcome = match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.cleanup_log.record(step, outcome);
    }

    fn skip_step(&self, step: &str, reason: &str) {
        self.cleanup_log.record(
            step,
            StepOutcome::Skipped {
                reason: reason.to_string(),
            },
        );
    }

    async fn settle(&self) -> Vec<ResourceInfo> {
        for _ in 0..SETTLE_ATTEMPTS {
            if self.resources.live_count() == 0 {
                break;
            }
            tokio::time::sleep(SETTLE_INTERVAL).await;
        }
        self.resources.live()
    }

    async fn check_lingering(&self) {
        let lingering = self.settle().await;
        if lingering.is_empty() {
            return;
        }

        for resource in &lingering {
            tracing::warn!(
                suite = %self.id,
                kind = %resource.kind,
                label = %resource.label,
                since = %resource.since,
                "Resource still alive after teardown"
            );
        }

        match self.settings.lingering_policy {
            LingeringPolicy::Warn => {
                tracing::warn!(count = lingering.len(), "Lingering resources left running");
            }
            LingeringPolicy::Exit => {
                tracing::error!(count = lingering.len(), "Lingering resources, exiting process");
                std::process::exit(0);
            }
        }
    }

    /// Out-of-band teardown after a fatal process error
    ///
    /// Runs at most once per framework; a second call returns a summary
    /// marked as skipped without touching anything.
    pub async fn emergency_cleanup(&self, error: FatalError) -> EmergencySummary {
        let previous_state = self.state.get();
        if self.emergency_initiated.swap(true, Ordering::SeqCst) {
            tracing::debug!(suite = %self.id, "Emergency cleanup already initiated");
            return EmergencySummary::skipped(self.id, error, previous_state);
        }

        tracing::error!(
            suite = %self.id,
            kind = %error.kind,
            message = %error.message,
            state = %previous_state,
            "Emergency cleanup"
        );
        self.fatal_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());

        // A phase stuck on the application (readiness, a hanging hook) holds the phase lock.
        self.aborted.send_replace(true);
        let executed_before = self.manager.lock().await.executions().len();
        let logged_before = self.cleanup_log.len();
        if matches!(
            previous_state,
            SuiteState::Configuring | SuiteState::Starting | SuiteState::Running
        ) {
            self.state.set(SuiteState::EmergencyCleanup);
        }

        let mut phases = Vec::new();
        if self.in_test() {
            phases.push(Phase::AfterEachTest);
            let teardown = self.run_after_each_test().await;
            self.record_step("after_each_test hooks", teardown);
        }

        let started = self.has_run_before_all.load(Ordering::SeqCst);
        let stopped = self.has_run_after_all.load(Ordering::SeqCst);
        if started && !stopped {
            phases.push(Phase::AfterTests);
            self.run_after_all().await;
        }

        let executions = self.manager.lock().await.executions();
        EmergencySummary {
            suite: self.id,
            error,
            skipped: false,
            previous_state,
            phases,
            steps: self.cleanup_log.since(logged_before),
            executions: executions.into_iter().skip(executed_before).collect(),
            lingering: self.resources.live(),
        }
    }
}

#[async_trait]
impl<L: HooksLibrary> EmergencyCleanup for TestFramework<L> {
    fn suite_id(&self) -> Uuid {
        self.id
    }

    async fn emergency_cleanup(&self, error: FatalError) -> EmergencySummary {
        TestFramework::emergency_cleanup(self, error).await
    }
}

mod common;

use common::{framework, DemoApp, UserRepository};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use suitekit::framework::{FatalKind, StepOutcome};
use suitekit::prelude::*;
use suitekit::{FatalError, Phase, SuiteState};

#[tokio::test]
async fn test_emergency_cleanup_inside_a_test_runs_teardown_once() {
    let framework = framework(DemoApp::default());
    framework.run_before_all(|_| Ok(())).await.unwrap();
    framework.run_before_each_test().await.unwrap();

    let hooks = framework.return_hooks();
    let mock = hooks
        .mock(Mock::<UserRepository>::new().returning::<u32, String>("find_name", "stub".into()))
        .unwrap();
    let pool = hooks.get::<common::DemoPool>().unwrap();

    let summary = framework
        .emergency_cleanup(FatalError::reported("database crashed"))
        .await;

    assert!(!summary.skipped);
    assert_eq!(summary.previous_state, SuiteState::Running);
    assert_eq!(summary.phases, vec![Phase::AfterEachTest, Phase::AfterTests]);
    let steps: Vec<&str> = summary.steps.iter().map(|entry| entry.step.as_str()).collect();
    assert_eq!(
        steps,
        vec![
            "after_each_test hooks",
            "after_tests hooks",
            "close listener",
            "reset container",
            "close persistence",
        ]
    );
    assert!(summary
        .steps
        .iter()
        .all(|entry| matches!(entry.outcome, StepOutcome::Completed)));
    assert!(summary.executions.iter().any(|execution| execution.phase == Phase::AfterEachTest));
    assert!(summary.lingering.is_empty());

    assert!(mock.is_restored());
    assert!(pool.is_closed());
    assert!(!framework.in_test());
    assert_eq!(framework.state(), SuiteState::Stopped);
    assert_eq!(framework.fatal_events().len(), 1);
    assert_eq!(framework.fatal_events()[0].kind, FatalKind::Reported);

    let logged = framework.cleanup_log().len();
    let again = framework
        .emergency_cleanup(FatalError::signal("SIGTERM"))
        .await;
    assert!(again.skipped);
    assert!(again.steps.is_empty());
    assert_eq!(again.previous_state, SuiteState::Stopped);
    assert_eq!(framework.cleanup_log().len(), logged);
    assert_eq!(framework.fatal_events().len(), 1);

    framework.run_after_all().await;
    assert_eq!(framework.cleanup_log().len(), logged);
}

#[tokio::test]
async fn test_emergency_cleanup_after_normal_teardown_does_nothing_twice() {
    let framework = framework(DemoApp::default());
    framework.run_before_all(|_| Ok(())).await.unwrap();
    framework.run_after_all().await;
    let logged = framework.cleanup_log().len();

    let summary = framework
        .emergency_cleanup(FatalError::panic("late panic"))
        .await;
    assert!(!summary.skipped);
    assert!(summary.phases.is_empty());
    assert!(summary.steps.is_empty());
    assert_eq!(framework.cleanup_log().len(), logged);
}

#[tokio::test]
async fn test_registry_reaches_every_live_suite() {
    let registry = SuiteRegistry::new();
    let first = Suite::new(framework(DemoApp::default()), &registry);
    let second = Suite::new(framework(DemoApp::default()), &registry);
    first.before_all(|_| Ok(())).await.unwrap();
    assert_eq!(registry.len(), 2);

    let summaries = registry.cleanup_all(FatalError::reported("boom")).await;
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|summary| !summary.skipped));

    let booted = summaries
        .iter()
        .find(|summary| summary.suite == first.framework().id())
        .unwrap();
    assert_eq!(booted.phases, vec![Phase::AfterTests]);
    assert_eq!(first.framework().state(), SuiteState::Stopped);

    let idle = summaries
        .iter()
        .find(|summary| summary.suite == second.framework().id())
        .unwrap();
    assert_eq!(idle.previous_state, SuiteState::Uninitialized);
    assert!(idle.phases.is_empty());

    drop(second);
    assert_eq!(registry.len(), 1);
    drop(first);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_failing_body_still_runs_per_test_teardown() {
    let registry = SuiteRegistry::new();
    let suite = Suite::new(framework(DemoApp::default()), &registry);
    suite.before_all(|_| Ok(())).await.unwrap();

    let result: suitekit::Result<()> = suite
        .test(|hooks| async move {
            hooks.mock(
                Mock::<UserRepository>::new().returning::<u32, String>("find_name", "stub".into()),
            )?;
            Err(SuiteError::Internal("assertion failed".into()))
        })
        .await;

    assert!(matches!(result, Err(SuiteError::Internal(message)) if message == "assertion failed"));
    assert!(!suite.framework().in_test());
    let repository = suite.hooks().get::<UserRepository>().unwrap();
    assert_eq!(repository.find_name(0).unwrap(), "alice");

    suite.after_all().await;
    assert_eq!(suite.framework().state(), SuiteState::Stopped);
}

#[tokio::test]
async fn test_panicking_body_is_resumed_after_teardown() {
    let registry = SuiteRegistry::new();
    let suite = Suite::new(framework(DemoApp::default()), &registry);
    suite.before_all(|_| Ok(())).await.unwrap();

    let outcome = AssertUnwindSafe(suite.test(|hooks| async move {
        let spy = hooks.spy::<UserRepository, u32, String>("find_name")?;
        if spy.call_count() == 0 {
            panic!("test body exploded");
        }
        Ok(())
    }))
    .catch_unwind()
    .await;

    let panic = outcome.err().unwrap();
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"test body exploded"));
    assert!(!suite.framework().in_test());
    assert_eq!(suite.framework().state(), SuiteState::Running);
    assert!(suite.framework().fatal_events().is_empty());

    let repository = suite.hooks().get::<UserRepository>().unwrap();
    assert!(repository.methods().instrumented_by("find_name").is_none());

    suite.after_all().await;
}

#[tokio::test]
async fn test_concurrent_emergency_cleanups_tear_down_once() {
    let framework = framework(DemoApp::default());
    framework.run_before_all(|_| Ok(())).await.unwrap();
    framework.run_before_each_test().await.unwrap();

    let (first, second) = tokio::join!(
        framework.emergency_cleanup(FatalError::signal("SIGINT")),
        framework.emergency_cleanup(FatalError::signal("SIGTERM")),
    );

    assert_ne!(first.skipped, second.skipped);
    let ran = if first.skipped { &second } else { &first };
    assert_eq!(ran.phases, vec![Phase::AfterEachTest, Phase::AfterTests]);

    let mut steps: Vec<String> = framework
        .cleanup_log()
        .into_iter()
        .map(|entry| entry.step)
        .collect();
    assert_eq!(steps.len(), 5);
    steps.sort();
    steps.dedup();
    assert_eq!(steps.len(), 5);

    assert_eq!(framework.fatal_events().len(), 1);
    assert_eq!(framework.state(), SuiteState::Stopped);
}

#[tokio::test]
async fn test_emergency_cleanup_interrupts_a_hanging_boot() {
    suitekit::logging::init_test_logging();
    let app = DemoApp {
        never_ready: true,
        ..DemoApp::default()
    };
    let framework = Arc::new(
        TestFramework::builder(app)
            .settings(HarnessSettings::default().lingering_policy(LingeringPolicy::Warn))
            .build()
            .unwrap(),
    );

    let booting = tokio::spawn({
        let framework = Arc::clone(&framework);
        async move { framework.run_before_all(|_| Ok(())).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(framework.state(), SuiteState::Starting);

    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        framework.emergency_cleanup(FatalError::signal("SIGINT")),
    )
    .await
    .expect("emergency cleanup finishes while boot waits for readiness");

    assert!(!summary.skipped);
    assert_eq!(summary.previous_state, SuiteState::Starting);
    assert_eq!(summary.phases, vec![Phase::AfterTests]);
    assert!(summary
        .steps
        .iter()
        .any(|entry| entry.step == "close listener" && matches!(entry.outcome, StepOutcome::Completed)));
    assert!(summary.lingering.is_empty());
    assert_eq!(framework.state(), SuiteState::Stopped);

    let booted = booting.await.unwrap();
    assert!(matches!(booted, Err(SuiteError::Interrupted { phase }) if phase == "before_all"));
}

#[tokio::test]
async fn test_recoverable_panics_leave_the_suite_running() {
    let registry = SuiteRegistry::new();
    let suite = Suite::new(framework(DemoApp::default()), &registry);
    suite.before_all(|_| Ok(())).await.unwrap();

    let worker = std::thread::spawn(|| {
        UserRepository::new(&[]).find_name(0).unwrap();
    });
    assert!(worker.join().is_err());

    let task = tokio::spawn(async {
        UserRepository::new(&[]).find_name(0).unwrap();
    });
    assert!(task.await.unwrap_err().is_panic());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(suite.framework().state(), SuiteState::Running);
    assert!(suite.framework().fatal_events().is_empty());
    assert!(suite.framework().app_view().is_some());

    suite.after_all().await;
}

#[test]
fn test_uncaught_panic_tears_down_suites_of_the_panicking_thread() {
    let (sender, receiver) = std::sync::mpsc::channel();
    let owner = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let registry = SuiteRegistry::new();
            let suite = Suite::new(framework(DemoApp::default()), &registry);
            suite.before_all(|_| Ok(())).await.unwrap();
            sender.send(Arc::clone(suite.framework())).unwrap();

            let repository = suite.hooks().get::<UserRepository>().unwrap();
            repository.find_name(7).expect("user 7 exists");
        });
    });
    assert!(owner.join().is_err());
    let framework = receiver.recv().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while framework.state() != SuiteState::Stopped && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(framework.state(), SuiteState::Stopped);

    let events = framework.fatal_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, FatalKind::Panic);
    assert!(events[0].message.contains("user 7 exists"));
    assert!(framework.app_view().is_none());
}

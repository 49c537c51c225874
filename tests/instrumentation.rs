mod common;

use common::{framework, http_get, DemoApp, UserRepository, UserService};
use suitekit::instrument::Outcome;
use suitekit::prelude::*;
use suitekit::Capability;

async fn running_suite(registry: &SuiteRegistry) -> Suite {
    let suite = Suite::new(framework(DemoApp::default()), registry);
    suite.before_all(|_| Ok(())).await.unwrap();
    suite
}

#[tokio::test]
async fn test_mock_is_seen_over_http_and_restored_after_test() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;
    let addr = suite.hooks().app().unwrap().listener_addr().unwrap();

    suite
        .test(|hooks| async move {
            let mock = hooks.mock(
                Mock::<UserRepository>::new().returning::<u32, String>("find_name", "mallory".into()),
            )?;
            assert_eq!(http_get(addr, "/users/0/greeting").await, (200, "Hello, mallory".to_string()));
            assert_eq!(mock.call_count("find_name"), 1);
            assert_eq!(mock.log::<u32, String>("find_name").unwrap().calls(), vec![0]);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(http_get(addr, "/users/0/greeting").await, (200, "Hello, alice".to_string()));
    suite.after_all().await;
}

#[tokio::test]
async fn test_throwing_mock_then_restore_returns_real_value() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;

    suite
        .test(|hooks| async move {
            let repository = hooks.get::<UserRepository>()?;
            let mock = hooks.mock(
                Mock::<UserRepository>::new()
                    .failing::<u32, String>("find_name", MethodError::msg("connection reset")),
            )?;

            let err = repository.find_name(1).unwrap_err();
            assert_eq!(err.to_string(), "connection reset");

            assert!(mock.restore());
            assert_eq!(repository.find_name(1).unwrap(), "bob");
            assert!(repository.find_name(9).is_err());
            Ok(())
        })
        .await
        .unwrap();

    suite.after_all().await;
}

#[tokio::test]
async fn test_original_is_reachable_through_a_live_mock() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;

    suite
        .test(|hooks| async move {
            let repository = hooks.get::<UserRepository>()?;
            let mock = hooks.mock(
                Mock::<UserRepository>::new()
                    .returning::<u32, String>("find_name", "stub".into())
                    .returning::<(), usize>("count", 99),
            )?;

            let find_name = mock.original::<u32, String>("find_name").unwrap();
            assert_eq!(find_name.call(0).await.unwrap(), "alice");
            let count = mock.original::<(), usize>("count").unwrap();
            assert_eq!(count.call(()).await.unwrap(), 2);

            assert_eq!(repository.find_name(0).unwrap(), "stub");
            assert_eq!(mock.call_count("find_name"), 1);
            Ok(())
        })
        .await
        .unwrap();

    suite.after_all().await;
}

#[tokio::test]
async fn test_async_mock_keeps_flavor() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;
    let addr = suite.hooks().app().unwrap().listener_addr().unwrap();

    suite
        .test(|hooks| async move {
            hooks.mock(
                Mock::<UserRepository>::new().future("count", |_: Arc<UserRepository>, _: ()| async {
                    Ok(42usize)
                }),
            )?;
            assert_eq!(http_get(addr, "/users/count").await, (200, "42".to_string()));

            let err = hooks
                .mock(Mock::<UserService>::new().sync("greet", |_: &UserService, _: u32| {
                    Ok("sync".to_string())
                }))
                .unwrap_err();
            assert!(matches!(err, SuiteError::SignatureMismatch { .. }));
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(http_get(addr, "/users/count").await, (200, "2".to_string()));
    suite.after_all().await;
}

#[tokio::test]
async fn test_spy_records_sync_and_async_calls() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;
    let addr = suite.hooks().app().unwrap().listener_addr().unwrap();

    suite
        .test(|hooks| async move {
            let finds = hooks.spy::<UserRepository, u32, String>("find_name")?;
            let greets = hooks.spy::<UserService, u32, String>("greet")?;

            for id in [1, 0, 7] {
                http_get(addr, &format!("/users/{id}/greeting")).await;
            }

            assert_eq!(finds.call_count(), 3);
            assert_eq!(finds.calls(), vec![1, 0, 7]);
            assert_eq!(finds.results(), vec!["bob".to_string(), "alice".to_string()]);
            assert_eq!(finds.errors()[0].to_string(), "user 7 not found");

            assert_eq!(greets.calls(), vec![1, 0, 7]);
            let outcomes = greets.outcomes();
            assert_eq!(outcomes.len(), 3);
            assert!(matches!(&outcomes[0], Outcome::Returned(greeting) if greeting == "Hello, bob"));
            assert!(!outcomes[2].is_returned());
            assert!(greets.errors()[0].same_as(&finds.errors()[0]));
            Ok(())
        })
        .await
        .unwrap();

    let repository = suite.hooks().get::<UserRepository>().unwrap();
    assert!(repository.methods().instrumented_by("find_name").is_none());
    suite.after_all().await;
}

#[tokio::test]
async fn test_spy_on_mocked_method_is_rejected() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;

    suite
        .test(|hooks| async move {
            hooks.mock(Mock::<UserRepository>::new().returning::<u32, String>("find_name", "x".into()))?;
            let repository = hooks.get::<UserRepository>()?;
            assert_eq!(repository.methods().instrumented_by("find_name"), Some(Capability::Mock));

            let err = hooks.spy::<UserRepository, u32, String>("find_name").unwrap_err();
            assert!(matches!(err, SuiteError::AlreadyInstrumented { .. }));
            Ok(())
        })
        .await
        .unwrap();

    suite.after_all().await;
}

#[tokio::test]
async fn test_suite_mock_from_setup_lasts_until_after_all() {
    let registry = SuiteRegistry::new();
    let suite = Suite::new(framework(DemoApp::default()), &registry);
    suite
        .before_all(|setup| {
            setup.mock(Mock::<UserRepository>::new().returning::<u32, String>("find_name", "stub".into()))
        })
        .await
        .unwrap();

    for _ in 0..2 {
        suite
            .test(|hooks| async move {
                let service = hooks.get::<UserService>()?;
                assert_eq!(service.greet(0).await.unwrap(), "Hello, stub");
                Ok(())
            })
            .await
            .unwrap();
    }

    let mock = suite.hooks().mocked::<UserRepository>().unwrap();
    assert_eq!(mock.call_count("find_name"), 2);

    let repository = suite.hooks().get::<UserRepository>().unwrap();
    suite.after_all().await;
    assert!(mock.is_restored());
    assert_eq!(repository.find_name(0).unwrap(), "alice");
}

#[tokio::test]
async fn test_unknown_method_names_the_target_and_entries_close_after_all() {
    let registry = SuiteRegistry::new();
    let suite = running_suite(&registry).await;

    suite
        .test(|hooks| async move {
            let err = hooks
                .spy::<UserRepository, u32, String>("delete")
                .unwrap_err();
            assert!(matches!(&err, SuiteError::UnknownMethod { method, .. } if method == "delete"));
            assert!(err.to_string().contains("UserRepository"));
            Ok(())
        })
        .await
        .unwrap();

    suite.after_all().await;

    let err = suite
        .hooks()
        .mock(Mock::<UserRepository>::new())
        .unwrap_err();
    assert!(matches!(err, SuiteError::NotReady { .. }));
}

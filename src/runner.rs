//! Suite adapter for `#[tokio::test]`
//!
//! Binds a [`TestFramework`] to the test runner: one [`Suite`] per suite,
//! one [`Suite::test`] call per test.
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn users_api() -> suitekit::Result<()> {
//!     let registry = SuiteRegistry::new();
//!     let suite = Suite::new(TestFramework::builder(Api).build()?, &registry);
//!     suite.before_all(|setup| setup.config(json!({ "port": 0 }))).await?;
//!
//!     suite
//!         .test(|hooks| async move {
//!             let users = hooks.get::<UserService>()?;
//!             assert!(users.find("alice").await.is_ok());
//!             Ok(())
//!         })
//!         .await?;
//!
//!     suite.after_all().await;
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use crate::framework::fatal::{guarded, install_fatal_listeners};
use crate::framework::{SuiteRegistry, TestFramework};
use crate::library::{DefaultHooksLibrary, HooksLibrary, ReturnHooks, SetupHooks};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A framework registered for emergency cleanup
///
/// Dropping the suite deregisters it. Dropping does not tear it down; call
/// [`Suite::after_all`].
pub struct Suite<L: HooksLibrary = DefaultHooksLibrary> {
    framework: Arc<TestFramework<L>>,
    registry: SuiteRegistry,
}

impl<L: HooksLibrary> Suite<L> {
    /// Register `framework` with `registry` and make sure the fatal-error
    /// listeners of this process are installed
    pub fn new(framework: TestFramework<L>, registry: &SuiteRegistry) -> Self {
        let framework = Arc::new(framework);
        registry.register(&framework);
        install_fatal_listeners(registry, framework.settings().emergency_timeout);
        Self {
            framework,
            registry: registry.clone(),
        }
    }

    pub fn framework(&self) -> &Arc<TestFramework<L>> {
        &self.framework
    }

    pub fn hooks(&self) -> ReturnHooks {
        self.framework.return_hooks()
    }

    pub async fn before_all<F>(&self, setup: F) -> Result<()>
    where
        F: FnOnce(&SetupHooks) -> Result<()>,
    {
        self.framework.run_before_all(setup).await
    }

    /// Run one test body between the per-test phases
    ///
    /// Per-test teardown always runs. A teardown failure is reported only
    /// when the body itself succeeded, so it never hides the body's error
    /// or panic.
    pub async fn test<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(ReturnHooks) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Err(e) = self.framework.run_before_each_test().await {
            if let Err(teardown) = self.framework.run_after_each_test().await {
                tracing::error!(error = %teardown, "after_each_test failed after a failed before_each_test");
            }
            return Err(e);
        }

        let outcome = AssertUnwindSafe(guarded(body(self.framework.return_hooks())))
            .catch_unwind()
            .await;
        let teardown = self.framework.run_after_each_test().await;

        match outcome {
            Ok(Ok(value)) => teardown.map(|()| value),
            Ok(Err(e)) => {
                if let Err(teardown) = teardown {
                    tracing::error!(error = %teardown, "after_each_test failed after a failed test");
                }
                Err(e)
            }
            Err(panic) => {
                if let Err(teardown) = teardown {
                    tracing::error!(error = %teardown, "after_each_test failed after a panicking test");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    pub async fn after_all(&self) {
        self.framework.run_after_all().await
    }
}

impl<L: HooksLibrary> Drop for Suite<L> {
    fn drop(&mut self) {
        self.registry.deregister(self.framework.id());
    }
}

use super::{Hook, HookState};
use crate::app::AppView;
use crate::config::BootConfig;
use crate::error::{Result, SuiteError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

type ConfigStage = Arc<dyn Fn(BootConfig, HookState) -> BoxFuture<'static, Result<BootConfig>> + Send + Sync>;
type AppCallback = Arc<dyn Fn(AppView, HookState) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type Callback = Arc<dyn Fn(HookState) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A hook assembled from closures
///
/// Each callback receives the hook's own [`HookState`], so values captured
/// in one phase can be read back in a later one.
///
/// ```rust,ignore
/// let hook = FnHook::builder("database")
///     .priority(-10)
///     .before_start(|config, state| async move {
///         let db = TestDatabase::start().await?;
///         state.set("db", db.clone());
///         config.with(json!({ "database": { "url": db.url() } }))
///     })
///     .after_tests(|state| async move {
///         if let Some(db) = state.get::<TestDatabase>("db") {
///             db.stop().await?;
///         }
///         Ok(())
///     })
///     .build()?;
/// ```
pub struct FnHook {
    name: String,
    priority: i32,
    state: HookState,
    before_start: Vec<ConfigStage>,
    after_start: Option<AppCallback>,
    before_tests: Option<Callback>,
    after_tests: Option<Callback>,
    before_each_test: Option<Callback>,
    after_each_test: Option<Callback>,
}

impl FnHook {
    pub fn builder(name: impl Into<String>) -> FnHookBuilder {
        FnHookBuilder {
            hook: FnHook {
                name: name.into(),
                priority: 0,
                state: HookState::new(),
                before_start: Vec::new(),
                after_start: None,
                before_tests: None,
                after_tests: None,
                before_each_test: None,
                after_each_test: None,
            },
        }
    }

    pub fn state(&self) -> &HookState {
        &self.state
    }

    fn has_callbacks(&self) -> bool {
        !self.before_start.is_empty()
            || self.after_start.is_some()
            || self.before_tests.is_some()
            || self.after_tests.is_some()
            || self.before_each_test.is_some()
            || self.after_each_test.is_some()
    }

    async fn call(&self, callback: &Option<Callback>) -> Result<()> {
        match callback {
            Some(callback) => callback(self.state.clone()).await,
            None => Ok(()),
        }
    }
}

/// Builder for [`FnHook`]
pub struct FnHookBuilder {
    hook: FnHook,
}

fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(HookState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |state: HookState| f(state).boxed())
}

impl FnHookBuilder {
    pub fn priority(mut self, priority: i32) -> Self {
        self.hook.priority = priority;
        self
    }

    /// Add a boot configuration stage; stages run in the order added
    pub fn before_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(BootConfig, HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BootConfig>> + Send + 'static,
    {
        self.hook
            .before_start
            .push(Arc::new(move |config: BootConfig, state: HookState| {
                f(config, state).boxed()
            }));
        self
    }

    /// Merge a fixed patch into the boot configuration
    pub fn contribute(self, patch: Value) -> Self {
        self.before_start(move |config, _| {
            let patch = patch.clone();
            async move { config.with(patch) }
        })
    }

    pub fn after_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AppView, HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hook.after_start = Some(Arc::new(move |app: AppView, state: HookState| {
            f(app, state).boxed()
        }));
        self
    }

    pub fn before_tests<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hook.before_tests = Some(callback(f));
        self
    }

    pub fn after_tests<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hook.after_tests = Some(callback(f));
        self
    }

    pub fn before_each_test<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hook.before_each_test = Some(callback(f));
        self
    }

    pub fn after_each_test<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HookState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hook.after_each_test = Some(callback(f));
        self
    }

    /// Finish the hook; fails if no lifecycle callback was registered
    pub fn build(self) -> Result<FnHook> {
        if !self.hook.has_callbacks() {
            return Err(SuiteError::EmptyHook {
                hook: self.hook.name,
            });
        }
        Ok(self.hook)
    }
}

#[async_trait]
impl Hook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before_start(&self, mut config: BootConfig) -> Result<BootConfig> {
        for stage in &self.before_start {
            config = stage(config, self.state.clone()).await?;
        }
        Ok(config)
    }

    async fn after_start(&self, app: &AppView) -> Result<()> {
        match &self.after_start {
            Some(callback) => callback(app.clone(), self.state.clone()).await,
            None => Ok(()),
        }
    }

    async fn before_tests(&self) -> Result<()> {
        self.call(&self.before_tests).await
    }

    async fn after_tests(&self) -> Result<()> {
        self.call(&self.after_tests).await
    }

    async fn before_each_test(&self) -> Result<()> {
        self.call(&self.before_each_test).await
    }

    async fn after_each_test(&self) -> Result<()> {
        self.call(&self.after_each_test).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_without_callbacks_is_rejected() {
        let err = FnHook::builder("idle").priority(4).build().err().unwrap();
        assert!(matches!(err, SuiteError::EmptyHook { ref hook } if hook == "idle"));
    }

    #[tokio::test]
    async fn test_state_carries_across_phases() {
        let hook = FnHook::builder("counter")
            .contribute(json!({"server": {"port": 3000}}))
            .before_start(|config, state| async move {
                state.set("seen_port", config.pointer("/server/port").cloned());
                Ok(config)
            })
            .before_each_test(|state| async move {
                state.update::<u32, _>("tests", |n| *n += 1);
                Ok(())
            })
            .build()
            .unwrap();

        let config = hook.before_start(BootConfig::new()).await.unwrap();
        assert_eq!(config.pointer("/server/port"), Some(&json!(3000)));
        assert_eq!(
            hook.state().get::<Option<Value>>("seen_port"),
            Some(Some(json!(3000)))
        );

        hook.before_each_test().await.unwrap();
        hook.before_each_test().await.unwrap();
        assert_eq!(hook.state().get::<u32>("tests"), Some(2));
    }
}

//! Application Contract
//!
//! The application under test is a startable unit: it takes the merged boot
//! configuration and returns an [`AppView`] onto the running instance.

mod listener;
mod readiness;
mod resources;
mod view;

pub use listener::ListenerHandle;
pub use readiness::{Readiness, PERSISTENCE_READY, REQUIRED_SIGNALS, WIRING_COMPLETE};
pub use resources::{ResourceGuard, ResourceInfo, ResourceKind, ResourceTracker};
pub use view::{AppView, AppViewBuilder, PersistencePool};

use crate::config::BootConfig;
use crate::di::Container;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Everything an application needs to boot inside the harness
pub struct BootContext {
    config: BootConfig,
    resources: ResourceTracker,
    readiness: Readiness,
    span: tracing::Span,
}

impl BootContext {
    pub fn new(config: BootConfig, resources: ResourceTracker, readiness: Readiness) -> Self {
        Self {
            config,
            resources,
            readiness,
            span: tracing::info_span!("app"),
        }
    }

    /// The merged boot configuration
    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    /// Tracker for handles the application opens
    pub fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    /// Where the application raises its readiness events
    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Start an [`AppView`] wired to this context
    pub fn view(&self, container: Arc<Container>) -> AppViewBuilder {
        AppView::builder(container)
            .config(self.config.clone())
            .readiness(self.readiness.clone())
            .span(self.span.clone())
    }
}

/// A startable application
///
/// # Example
///
/// ```rust,ignore
/// struct Api;
///
/// #[async_trait]
/// impl Application for Api {
///     async fn start(&self, ctx: BootContext) -> Result<AppView> {
///         let container = Arc::new(build_container(ctx.config())?);
///         let listener = ListenerHandle::serve(router(&container), addr, ctx.resources()).await?;
///         ctx.readiness().signal(PERSISTENCE_READY);
///         ctx.readiness().signal(WIRING_COMPLETE);
///         Ok(ctx.view(container).listener(listener).build())
///     }
/// }
/// ```
#[async_trait]
pub trait Application: Send + Sync {
    async fn start(&self, ctx: BootContext) -> Result<AppView>;
}

/// An [`Application`] backed by a closure
pub struct FnApplication<F> {
    start: F,
}

/// Build an [`Application`] from an async closure
pub fn from_fn<F, Fut>(start: F) -> FnApplication<F>
where
    F: Fn(BootContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AppView>> + Send + 'static,
{
    FnApplication { start }
}

#[async_trait]
impl<F, Fut> Application for FnApplication<F>
where
    F: Fn(BootContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AppView>> + Send + 'static,
{
    async fn start(&self, ctx: BootContext) -> Result<AppView> {
        (self.start)(ctx).await
    }
}

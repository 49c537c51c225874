use super::listener::ListenerHandle;
use super::readiness::Readiness;
use crate::config::BootConfig;
use crate::di::Container;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// A persistence connection pool the harness closes during teardown
#[async_trait]
pub trait PersistencePool: Send + Sync {
    fn name(&self) -> &str;

    async fn close(&self) -> crate::error::Result<()>;
}

struct Inner {
    container: Arc<Container>,
    config: BootConfig,
    listener_addr: Option<SocketAddr>,
    listener: Mutex<Option<ListenerHandle>>,
    persistence: Option<Arc<dyn PersistencePool>>,
    readiness: Readiness,
    span: tracing::Span,
}

/// Handle to a booted application
///
/// Clones share the same application.
#[derive(Clone)]
pub struct AppView {
    inner: Arc<Inner>,
}

impl AppView {
    pub fn builder(container: Arc<Container>) -> AppViewBuilder {
        AppViewBuilder {
            container,
            config: BootConfig::new(),
            listener: None,
            persistence: None,
            readiness: Readiness::new(),
            span: tracing::Span::none(),
        }
    }

    /// The live DI container
    pub fn container(&self) -> &Arc<Container> {
        &self.inner.container
    }

    /// Effective configuration the application booted with
    pub fn config(&self) -> &BootConfig {
        &self.inner.config
    }

    /// Span the application logs under
    pub fn logger(&self) -> &tracing::Span {
        &self.inner.span
    }

    pub fn readiness(&self) -> &Readiness {
        &self.inner.readiness
    }

    /// Address of the network listener, if the application opened one
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.inner.listener_addr
    }

    /// Take the listener out of the view; `None` if absent or already taken
    pub fn take_listener(&self) -> Option<ListenerHandle> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn persistence(&self) -> Option<&Arc<dyn PersistencePool>> {
        self.inner.persistence.as_ref()
    }

    /// Base URL of the listener, e.g. `http://127.0.0.1:41234`
    pub fn base_url(&self) -> Option<String> {
        self.listener_addr().map(|addr| format!("http://{addr}"))
    }
}

impl std::fmt::Debug for AppView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppView")
            .field("listener_addr", &self.inner.listener_addr)
            .field("config_keys", &self.inner.config.len())
            .field("persistence", &self.inner.persistence.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Builder for [`AppView`]
pub struct AppViewBuilder {
    container: Arc<Container>,
    config: BootConfig,
    listener: Option<ListenerHandle>,
    persistence: Option<Arc<dyn PersistencePool>>,
    readiness: Readiness,
    span: tracing::Span,
}

impl AppViewBuilder {
    pub fn config(mut self, config: BootConfig) -> Self {
        self.config = config;
        self
    }

    pub fn listener(mut self, listener: ListenerHandle) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn persistence(mut self, pool: Arc<dyn PersistencePool>) -> Self {
        self.persistence = Some(pool);
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn build(self) -> AppView {
        AppView {
            inner: Arc::new(Inner {
                container: self.container,
                config: self.config,
                listener_addr: self.listener.as_ref().map(ListenerHandle::local_addr),
                listener: Mutex::new(self.listener),
                persistence: self.persistence,
                readiness: self.readiness,
                span: self.span,
            }),
        }
    }
}

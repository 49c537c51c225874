use super::resources::{ResourceGuard, ResourceKind, ResourceTracker};
use crate::error::{Result, SuiteError};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running HTTP listener of the application under test
///
/// Dropping the handle also triggers graceful shutdown, but only
/// [`ListenerHandle::close`] waits for the server to finish.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
    _guard: ResourceGuard,
}

impl ListenerHandle {
    /// Bind `addr` and serve `router` on it in the background
    ///
    /// Binding port 0 picks a free port; see [`ListenerHandle::local_addr`].
    pub async fn serve(router: Router, addr: SocketAddr, tracker: &ResourceTracker) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tracker.spawn(format!("http server {local_addr}"), async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                    tracing::debug!("Listener shutting down");
                })
                .await
        });

        tracing::info!(%local_addr, "Listener started");
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            task,
            _guard: tracker.track(ResourceKind::Listener, local_addr.to_string()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn close(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let served = (&mut self.task)
            .await
            .map_err(|e| SuiteError::Internal(format!("listener task failed: {e}")))?;
        served?;
        tracing::info!(local_addr = %self.local_addr, "Listener closed");
        Ok(())
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("local_addr", &self.local_addr)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_serve_and_close_releases_resources() {
        let tracker = ResourceTracker::new();
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let handle = ListenerHandle::serve(router, ([127, 0, 0, 1], 0).into(), &tracker)
            .await
            .unwrap();
        assert_eq!(tracker.live_count(), 2);

        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.ends_with("pong"));

        handle.close().await.unwrap();
        assert_eq!(tracker.live_count(), 0);
    }
}

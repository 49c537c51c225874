use crate::di::Container;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use std::ops::Deref;
use std::sync::Arc;

/// Handler argument resolved from the container on every request
///
/// Resolution is per request, so a mock or spy installed on the live
/// singleton is what the next request sees.
///
/// ```ignore
/// async fn greeting(Inject(users): Inject<UserService>, Path(id): Path<u32>) -> String {
///     users.greet(id).await.unwrap_or_default()
/// }
/// ```
pub struct Inject<T>(pub Arc<T>);

/// Router state that exposes the application's container
pub trait HasContainer {
    fn get_container(&self) -> &Container;
}

impl<S, T> FromRequestParts<S> for Inject<T>
where
    S: HasContainer + Send + Sync,
    T: Send + Sync + 'static,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        state.get_container().get::<T>().map(Inject).map_err(|e| {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Injection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    }
}

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

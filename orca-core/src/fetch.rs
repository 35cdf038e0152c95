//! Collaborator traits for obtaining entities from outside a cache.
//!
//! A [`Fetcher`] reaches the source of truth (normally the network) and is
//! owned entirely by the caller. A [`Resolver`] is how one entity type's
//! adapter obtains a referenced entity of another type, usually through that
//! type's cache.

use crate::{FetchError, Key, OrcaResult};
use async_trait::async_trait;
use std::future::Future;

/// Obtains the value for a key from its source.
///
/// Retries, timeouts and cancellation are the fetcher's own business; the
/// cache only sees the settled result.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self, key: &Key) -> Result<T, FetchError>;
}

/// Resolves a referenced entity by key.
#[async_trait]
pub trait Resolver<T>: Send + Sync {
    async fn resolve(&self, key: &Key) -> OrcaResult<T>;
}

/// [`Fetcher`] backed by an async closure. Built with [`fetch_fn`].
#[derive(Clone)]
pub struct FetchFn<F> {
    f: F,
}

/// Wrap an async closure taking an owned [`Key`] as a [`Fetcher`].
///
/// ```ignore
/// let fetcher = Arc::new(fetch_fn(|key: Key| async move {
///     api.profile(key.as_str()).await.map_err(|e| FetchError::failed(key, e.to_string()))
/// }));
/// let profile = cache.get_or_fetch(&key, fetcher).await?;
/// ```
pub fn fetch_fn<F>(f: F) -> FetchFn<F> {
    FetchFn { f }
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for FetchFn<F>
where
    F: Fn(Key) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, FetchError>> + Send,
    T: Send + 'static,
{
    async fn fetch(&self, key: &Key) -> Result<T, FetchError> {
        (self.f)(key.clone()).await
    }
}

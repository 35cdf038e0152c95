//! Caches as resolvers for cross-entity references.

use std::sync::Arc;

use async_trait::async_trait;
use orca_core::{Fetcher, Key, OrcaResult, Resolver};

use crate::cache::EntityCache;
use crate::ledger::AccessLedger;
use crate::storage::Storage;

/// [`Resolver`] backed by an [`EntityCache`].
///
/// With a fetcher, unresolved keys are fetched and cached like any other
/// miss; without one they fail with `OrcaError::NotFound`.
pub struct CacheResolver<T, S, L> {
    cache: EntityCache<T, S, L>,
    fetcher: Option<Arc<dyn Fetcher<T>>>,
}

impl<T, S, L> CacheResolver<T, S, L> {
    pub fn new(cache: EntityCache<T, S, L>, fetcher: Option<Arc<dyn Fetcher<T>>>) -> Self {
        Self { cache, fetcher }
    }
}

impl<T, S, L> Clone for CacheResolver<T, S, L> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

#[async_trait]
impl<T, S, L> Resolver<T> for CacheResolver<T, S, L>
where
    T: Clone + Send + Sync + 'static,
    S: Storage<T> + 'static,
    L: AccessLedger + 'static,
{
    async fn resolve(&self, key: &Key) -> OrcaResult<T> {
        match &self.fetcher {
            Some(fetcher) => self.cache.get_or_fetch(key, Arc::clone(fetcher)).await,
            None => self.cache.get(key).await,
        }
    }
}

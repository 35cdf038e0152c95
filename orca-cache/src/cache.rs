//! The cache façade.
//!
//! [`EntityCache`] composes a [`Storage`] backend, an [`AccessLedger`] and a
//! per-call [`Fetcher`]. It is the only component callers talk to.
//!
//! # Consistency
//!
//! - Concurrent misses of one key share a single fetch; every waiter receives
//!   the same value or the same error.
//! - A fetch's store and a direct [`put`](EntityCache::put) of the same key
//!   are serialized by a per-key lock. A `put` marks any in-flight fetch as
//!   superseded, so the put's value is what remains stored.
//! - Eviction never removes a key with a fetch in flight or a write under way.

use std::sync::Arc;

use chrono::TimeDelta;
use orca_core::{
    CacheConfig, Clock, EntityType, Fetcher, Key, OrcaError, OrcaResult, SystemClock, Timestamp,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::adapter::EntityAdapter;
use crate::flight::{FlightHandle, FlightMap, Join, KeyLocks};
use crate::ledger::{AccessLedger, AccessRecord, InMemoryAccessLedger};
use crate::resolver::CacheResolver;
use crate::stats::{CacheStats, StatsRecorder};
use crate::storage::{InMemoryStorage, Storage};

/// Cache for one entity type.
///
/// Cheap to clone; clones share storage, ledger and in-flight fetches.
///
/// # Example
///
/// ```ignore
/// let profiles = EntityCache::ephemeral(ProfileAdapter, CacheConfig::new().with_capacity(100))?;
/// profiles.put(&profile.id, &profile).await?;
/// let again = profiles.get(&profile.id).await?;
/// ```
pub struct EntityCache<T, S, L> {
    core: Arc<CacheCore<T, S, L>>,
}

impl<T, S, L> Clone for EntityCache<T, S, L> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

struct CacheCore<T, S, L> {
    storage: S,
    ledger: L,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    flights: Arc<FlightMap<T>>,
    locks: KeyLocks,
    /// Held for reading by every store, for writing by `clear`.
    clearing: RwLock<()>,
    /// Serializes eviction runs.
    eviction: Mutex<()>,
    stats: StatsRecorder,
}

impl<A: EntityAdapter> EntityCache<A::Entity, InMemoryStorage<A>, InMemoryAccessLedger> {
    /// Cache kept entirely in process memory.
    pub fn ephemeral(adapter: A, config: CacheConfig) -> OrcaResult<Self> {
        Self::new(
            InMemoryStorage::new(adapter),
            InMemoryAccessLedger::new(),
            config,
        )
    }
}

impl<T, S, L> EntityCache<T, S, L>
where
    T: Clone + Send + Sync + 'static,
    S: Storage<T> + 'static,
    L: AccessLedger + 'static,
{
    /// Create a cache using the wall clock.
    ///
    /// # Errors
    ///
    /// Returns `OrcaError::Config` if `config` fails validation.
    pub fn new(storage: S, ledger: L, config: CacheConfig) -> OrcaResult<Self> {
        Self::with_clock(storage, ledger, config, Arc::new(SystemClock))
    }

    /// Create a cache stamping accesses with `clock`.
    pub fn with_clock(
        storage: S,
        ledger: L,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> OrcaResult<Self> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(CacheCore {
                storage,
                ledger,
                clock,
                config,
                flights: Arc::new(FlightMap::new()),
                locks: KeyLocks::new(),
                clearing: RwLock::new(()),
                eviction: Mutex::new(()),
                stats: StatsRecorder::default(),
            }),
        })
    }

    pub fn entity_type(&self) -> EntityType {
        self.core.storage.entity_type()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.core.config
    }

    /// Read a stored value without fetching.
    ///
    /// # Errors
    ///
    /// - `OrcaError::NotFound` if nothing usable is stored for `key`
    /// - storage, adapter and ledger errors as they occur
    pub async fn get(&self, key: &Key) -> OrcaResult<T> {
        self.core
            .lookup(key, true)
            .await?
            .ok_or_else(|| OrcaError::not_found(self.entity_type(), key.clone()))
    }

    /// Read a stored value, fetching and storing it on a miss.
    ///
    /// Concurrent misses of the same key call `fetcher` once between them.
    /// A fetch runs to completion even if every caller waiting on it goes
    /// away, and its result is stored unless a newer write superseded it.
    ///
    /// # Errors
    ///
    /// - `OrcaError::Fetch` if the fetch failed; nothing is stored
    /// - storage, adapter and ledger errors as they occur
    pub async fn get_or_fetch<F>(&self, key: &Key, fetcher: Arc<F>) -> OrcaResult<T>
    where
        F: Fetcher<T> + ?Sized + 'static,
    {
        if let Some(value) = self.core.lookup(key, true).await? {
            return Ok(value);
        }

        match self.core.flights.join_or_start(key) {
            Join::Joined(outcome) => {
                self.core.stats.coalesce();
                debug!(entity_type = %self.entity_type(), key = %key, "Joined in-flight fetch");
                outcome.await
            }
            Join::Started(outcome, handle) => {
                let core = Arc::clone(&self.core);
                tokio::spawn(core.fly(key.clone(), fetcher, handle));
                outcome.await
            }
        }
    }

    /// Store `value` under `key`, overwriting any existing entry.
    ///
    /// A fetch of `key` still in flight will not overwrite this value.
    pub async fn put(&self, key: &Key, value: &T) -> OrcaResult<()> {
        {
            let _clearing = self.core.clearing.read().await;
            let _lock = self.core.locks.lock(key).await;
            if self.core.flights.supersede(key) {
                debug!(entity_type = %self.entity_type(), key = %key, "Write supersedes in-flight fetch");
            }
            self.core.storage.store(key, value).await?;
            self.core
                .ledger
                .record_store(key, self.core.clock.now())
                .await?;
        }
        self.core.evict().await;
        Ok(())
    }

    /// Remove the entry for `key`. Removing an absent key is not an error.
    pub async fn remove(&self, key: &Key) -> OrcaResult<()> {
        let _lock = self.core.locks.lock(key).await;
        self.core.storage.remove(key).await?;
        self.core.ledger.forget(key).await?;
        debug!(entity_type = %self.entity_type(), key = %key, "Removed entry");
        Ok(())
    }

    /// Remove every entry. Fetches in flight will not store their results.
    pub async fn clear(&self) -> OrcaResult<()> {
        let _clearing = self.core.clearing.write().await;
        let superseded = self.core.flights.supersede_all();
        self.core.storage.clear().await?;
        self.core.ledger.clear().await?;
        debug!(entity_type = %self.entity_type(), superseded, "Cleared cache");
        Ok(())
    }

    /// Whether `key` is stored. Does not count as an access.
    pub async fn contains(&self, key: &Key) -> OrcaResult<bool> {
        self.core.storage.contains(key).await
    }

    /// Number of stored entries.
    pub async fn len(&self) -> OrcaResult<usize> {
        self.core.storage.len().await
    }

    pub async fn is_empty(&self) -> OrcaResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Access bookkeeping for `key`.
    pub async fn access_record(&self, key: &Key) -> OrcaResult<Option<AccessRecord>> {
        self.core.ledger.record(key).await
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats.snapshot()
    }

    /// Expose this cache to other entity types' adapters. Misses fail with
    /// `OrcaError::NotFound`.
    pub fn resolver(&self) -> CacheResolver<T, S, L> {
        CacheResolver::new(self.clone(), None)
    }

    /// Like [`resolver`](Self::resolver), but misses are fetched.
    pub fn resolver_with<F>(&self, fetcher: Arc<F>) -> CacheResolver<T, S, L>
    where
        F: Fetcher<T> + 'static,
    {
        let fetcher: Arc<dyn Fetcher<T>> = fetcher;
        CacheResolver::new(self.clone(), Some(fetcher))
    }
}

impl<T, S, L> CacheCore<T, S, L>
where
    T: Clone + Send + Sync + 'static,
    S: Storage<T> + 'static,
    L: AccessLedger + 'static,
{
    /// Stored, unexpired value for `key`, recording the access.
    async fn lookup(&self, key: &Key, counted: bool) -> OrcaResult<Option<T>> {
        let entity_type = self.storage.entity_type();
        if !self.storage.contains(key).await? {
            if counted {
                self.stats.miss();
                debug!(entity_type = %entity_type, key = %key, "Cache miss");
            }
            return Ok(None);
        }

        if self.config.expires() && self.expire_if_stale(key).await? {
            if counted {
                self.stats.miss();
            }
            return Ok(None);
        }

        match self.storage.get(key).await {
            Ok(value) => {
                self.ledger.record_access(key, self.clock.now()).await?;
                if counted {
                    self.stats.hit();
                    trace!(entity_type = %entity_type, key = %key, "Cache hit");
                }
                Ok(Some(value))
            }
            // Removed between `contains` and `get`.
            Err(e) if e.is_not_found() => {
                if counted {
                    self.stats.miss();
                    debug!(entity_type = %entity_type, key = %key, "Cache miss");
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn is_stale(&self, record: &AccessRecord, now: Timestamp) -> bool {
        let past = |since: Timestamp, limit: std::time::Duration| {
            let limit = TimeDelta::from_std(limit).unwrap_or(TimeDelta::MAX);
            now.signed_duration_since(since) >= limit
        };
        self.config
            .time_to_idle
            .is_some_and(|tti| past(record.last_accessed_at, tti))
            || self
                .config
                .time_to_live
                .is_some_and(|ttl| past(record.stored_at, ttl))
    }

    /// Drop `key` if it outlived its time-to-idle or time-to-live.
    async fn expire_if_stale(&self, key: &Key) -> OrcaResult<bool> {
        let stale = |record: Option<AccessRecord>| {
            record.is_some_and(|record| self.is_stale(&record, self.clock.now()))
        };
        if !stale(self.ledger.record(key).await?) {
            return Ok(false);
        }

        let _lock = self.locks.lock(key).await;
        // A write may have refreshed the entry while we waited.
        if !stale(self.ledger.record(key).await?) {
            return Ok(false);
        }
        self.storage.remove(key).await?;
        self.ledger.forget(key).await?;
        self.stats.expire();
        debug!(entity_type = %self.storage.entity_type(), key = %key, "Expired entry");
        Ok(true)
    }

    /// Drive a registered flight to completion and deliver its outcome.
    async fn fly<F>(self: Arc<Self>, key: Key, fetcher: Arc<F>, handle: FlightHandle<T>)
    where
        F: Fetcher<T> + ?Sized + 'static,
    {
        let outcome = self.fetch_and_store(&key, fetcher.as_ref(), &handle).await;
        let landed = handle.land();
        if outcome.is_ok() {
            self.evict().await;
        }
        landed.deliver(outcome);
    }

    async fn fetch_and_store<F>(
        &self,
        key: &Key,
        fetcher: &F,
        handle: &FlightHandle<T>,
    ) -> OrcaResult<T>
    where
        F: Fetcher<T> + ?Sized,
    {
        let entity_type = self.storage.entity_type();

        // A write may have landed between the caller's miss and registration.
        if let Some(value) = self.lookup(key, false).await? {
            return Ok(value);
        }

        self.stats.fetch();
        debug!(entity_type = %entity_type, key = %key, "Fetching");
        let value = match fetcher.fetch(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(entity_type = %entity_type, key = %key, error = %e, "Fetch failed");
                return Err(e.into());
            }
        };

        let _clearing = self.clearing.read().await;
        let _lock = self.locks.lock(key).await;
        if handle.is_superseded() {
            debug!(entity_type = %entity_type, key = %key, "Discarding fetched value superseded by a newer write");
            return Ok(value);
        }
        self.storage.store(key, &value).await?;
        self.ledger.record_store(key, self.clock.now()).await?;
        debug!(entity_type = %entity_type, key = %key, "Fetched and stored");
        Ok(value)
    }

    /// Bring the entry count back within capacity. Errors are logged.
    async fn evict(&self) {
        let Some(capacity) = self.config.capacity else {
            return;
        };
        let _running = self.eviction.lock().await;
        if let Err(e) = self.evict_to(capacity).await {
            warn!(entity_type = %self.storage.entity_type(), error = %e, "Eviction failed");
        }
    }

    async fn evict_to(&self, capacity: usize) -> OrcaResult<()> {
        let entity_type = self.storage.entity_type();
        let mut len = self.storage.len().await?;
        if len <= capacity {
            return Ok(());
        }

        for key in self.ledger.coldest_keys(len).await? {
            if len <= capacity {
                break;
            }
            if self.flights.contains(&key) {
                trace!(entity_type = %entity_type, key = %key, "Skipping eviction of key with fetch in flight");
                continue;
            }
            let Some(_lock) = self.locks.try_lock(&key) else {
                trace!(entity_type = %entity_type, key = %key, "Skipping eviction of key being written");
                continue;
            };
            if let Err(e) = self.storage.remove(&key).await {
                warn!(entity_type = %entity_type, key = %key, error = %e, "Failed to evict entry");
                continue;
            }
            if let Err(e) = self.ledger.forget(&key).await {
                warn!(entity_type = %entity_type, key = %key, error = %e, "Failed to forget evicted entry");
            }
            self.stats.evict();
            debug!(entity_type = %entity_type, key = %key, "Evicted entry");
            len = self.storage.len().await?;
        }

        if len > capacity {
            debug!(entity_type = %entity_type, len, capacity, "Eviction deferred, remaining entries are busy");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::IdentityAdapter;
    use orca_core::{FetchError, ManualClock};
    use orca_test_utils::fetchers::{CountingFetcher, GatedFetcher};
    use std::time::Duration;

    type TestCache = EntityCache<String, InMemoryStorage<IdentityAdapter<String>>, InMemoryAccessLedger>;

    fn cache_with(config: CacheConfig, clock: &ManualClock) -> TestCache {
        EntityCache::with_clock(
            InMemoryStorage::new(IdentityAdapter::new(EntityType::Profile)),
            InMemoryAccessLedger::new(),
            config,
            Arc::new(clock.clone()),
        )
        .expect("cache should build")
    }

    fn key(k: &str) -> Key {
        Key::from(k)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = EntityCache::ephemeral(
            IdentityAdapter::<String>::new(EntityType::Post),
            CacheConfig::new().with_capacity(0),
        );
        assert!(matches!(result, Err(OrcaError::Config(_))));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        let err = cache.get(&key("a")).await.unwrap_err();
        assert_eq!(err, OrcaError::not_found(EntityType::Profile, "a"));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_hit_records_access() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(CacheConfig::new(), &clock);
        cache.put(&key("a"), &"A".to_string()).await.expect("put should succeed");

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get(&key("a")).await.expect("get should succeed"), "A");

        let record = cache
            .access_record(&key("a"))
            .await
            .expect("access_record should succeed")
            .expect("record should exist");
        assert_eq!(record.access_count, 2);
        assert_eq!(record.last_accessed_at, clock.now());
        assert_eq!(record.stored_at, Timestamp::UNIX_EPOCH);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_contains_does_not_touch_ledger() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        cache.put(&key("a"), &"A".to_string()).await.expect("put should succeed");

        assert!(cache.contains(&key("a")).await.expect("contains should succeed"));
        let record = cache
            .access_record(&key("a"))
            .await
            .expect("access_record should succeed")
            .expect("record should exist");
        assert_eq!(record.access_count, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_stores_nothing() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        let fetcher = Arc::new(CountingFetcher::<String>::failing("offline"));

        let err = cache.get_or_fetch(&key("a"), fetcher.clone()).await.unwrap_err();
        assert_eq!(err, OrcaError::Fetch(FetchError::failed("a", "offline")));
        assert!(!cache.contains(&key("a")).await.expect("contains should succeed"));
        assert_eq!(
            cache.access_record(&key("a")).await.expect("access_record should succeed"),
            None
        );
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_put_supersedes_in_flight_fetch() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        let fetcher = Arc::new(GatedFetcher::new(|_: &Key| Ok("fetched".to_string())));

        let waiter = {
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move { cache.get_or_fetch(&key("a"), fetcher).await })
        };
        fetcher.wait_started().await;

        cache.put(&key("a"), &"written".to_string()).await.expect("put should succeed");
        fetcher.release(1);

        let fetched = waiter
            .await
            .expect("task should not panic")
            .expect("get_or_fetch should succeed");
        assert_eq!(fetched, "fetched");
        assert_eq!(cache.get(&key("a")).await.expect("get should succeed"), "written");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clear_supersedes_in_flight_fetch() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        cache.put(&key("b"), &"B".to_string()).await.expect("put should succeed");
        let fetcher = Arc::new(GatedFetcher::new(|_: &Key| Ok("fetched".to_string())));

        let waiter = {
            let cache = cache.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move { cache.get_or_fetch(&key("a"), fetcher).await })
        };
        fetcher.wait_started().await;

        cache.clear().await.expect("clear should succeed");
        fetcher.release(1);
        waiter
            .await
            .expect("task should not panic")
            .expect("get_or_fetch should succeed");

        assert!(cache.is_empty().await.expect("is_empty should succeed"));
    }

    #[tokio::test]
    async fn test_eviction_removes_coldest() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(CacheConfig::new().with_capacity(2), &clock);

        for k in ["a", "b", "c"] {
            cache.put(&key(k), &k.to_uppercase()).await.expect("put should succeed");
            clock.advance(Duration::from_secs(1));
        }

        assert!(!cache.contains(&key("a")).await.expect("contains should succeed"));
        assert_eq!(cache.len().await.expect("len should succeed"), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(
            cache.access_record(&key("a")).await.expect("access_record should succeed"),
            None
        );
    }

    #[tokio::test]
    async fn test_fetched_entries_count_toward_capacity() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(CacheConfig::new().with_capacity(1), &clock);
        let fetcher = Arc::new(CountingFetcher::new(|k: &Key| Ok(k.to_string())));

        cache.get_or_fetch(&key("a"), fetcher.clone()).await.expect("fetch should succeed");
        clock.advance(Duration::from_secs(1));
        cache.get_or_fetch(&key("b"), fetcher.clone()).await.expect("fetch should succeed");

        assert!(!cache.contains(&key("a")).await.expect("contains should succeed"));
        assert!(cache.contains(&key("b")).await.expect("contains should succeed"));
    }

    #[tokio::test]
    async fn test_time_to_live_expires_entries() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(
            CacheConfig::new().with_time_to_live(Duration::from_secs(30)),
            &clock,
        );
        let fetcher = Arc::new(CountingFetcher::new(|_: &Key| Ok("fresh".to_string())));
        cache.put(&key("a"), &"stale".to_string()).await.expect("put should succeed");

        clock.advance(Duration::from_secs(29));
        assert_eq!(
            cache.get_or_fetch(&key("a"), fetcher.clone()).await.expect("get should succeed"),
            "stale"
        );
        assert_eq!(fetcher.calls(), 0);

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            cache.get_or_fetch(&key("a"), fetcher.clone()).await.expect("get should succeed"),
            "fresh"
        );
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_time_to_idle_is_refreshed_by_reads() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(
            CacheConfig::new().with_time_to_idle(Duration::from_secs(10)),
            &clock,
        );
        cache.put(&key("a"), &"A".to_string()).await.expect("put should succeed");

        clock.advance(Duration::from_secs(8));
        cache.get(&key("a")).await.expect("get should succeed");
        clock.advance(Duration::from_secs(8));
        cache.get(&key("a")).await.expect("get should succeed");

        clock.advance(Duration::from_secs(11));
        assert!(cache.get(&key("a")).await.unwrap_err().is_not_found());
        assert!(!cache.contains(&key("a")).await.expect("contains should succeed"));
    }

    #[tokio::test]
    async fn test_eviction_skips_key_being_written() {
        let clock = ManualClock::at_epoch();
        let cache = cache_with(CacheConfig::new().with_capacity(1), &clock);
        let core = &cache.core;
        let cold = key("cold");

        // Some key whose lock stripe differs from the cold key's.
        let held = core.locks.lock(&cold).await;
        let warm = (0..32)
            .map(|i| key(&format!("warm-{i}")))
            .find(|k| core.locks.try_lock(k).is_some())
            .expect("some key should land on another stripe");

        for k in [&cold, &warm] {
            core.storage.store(k, &k.to_string()).await.expect("store should succeed");
            core.ledger.record_store(k, clock.now()).await.expect("record should succeed");
            clock.advance(Duration::from_secs(1));
        }

        core.evict().await;
        assert!(cache.contains(&cold).await.expect("contains should succeed"));
        assert!(!cache.contains(&warm).await.expect("contains should succeed"));
        assert_eq!(cache.stats().evictions, 1);

        drop(held);
        core.storage.store(&warm, &"again".to_string()).await.expect("store should succeed");
        core.ledger.record_store(&warm, clock.now()).await.expect("record should succeed");
        core.evict().await;
        assert!(!cache.contains(&cold).await.expect("contains should succeed"));
        assert!(cache.contains(&warm).await.expect("contains should succeed"));
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_noop() {
        let cache = cache_with(CacheConfig::new(), &ManualClock::at_epoch());
        cache.remove(&key("ghost")).await.expect("remove should succeed");
    }
}

//! In-memory access ledger.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use orca_core::{Key, OrcaResult, Timestamp};
use tokio::sync::RwLock;

use super::{AccessLedger, AccessRecord};

type Rank = (Timestamp, u64, Key);

#[derive(Default)]
struct Inner {
    records: HashMap<Key, AccessRecord>,
    /// Records ordered coldest first; kept in step with `records`.
    ranked: BTreeSet<Rank>,
}

impl Inner {
    /// Apply `update` to the record for `key`, if there is one.
    fn update(&mut self, key: &Key, update: impl FnOnce(&mut AccessRecord)) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        self.ranked
            .remove(&(record.last_accessed_at, record.access_count, key.clone()));
        update(record);
        self.ranked
            .insert((record.last_accessed_at, record.access_count, key.clone()));
        true
    }

    fn upsert(&mut self, key: &Key, at: Timestamp, update: impl FnOnce(&mut AccessRecord)) {
        if self.update(key, update) {
            return;
        }
        let record = AccessRecord::new(key.clone(), at);
        self.ranked
            .insert((record.last_accessed_at, record.access_count, key.clone()));
        self.records.insert(key.clone(), record);
    }
}

/// Ledger kept in process memory, ranked incrementally so finding the coldest
/// keys doesn't scan every record.
#[derive(Default)]
pub struct InMemoryAccessLedger {
    inner: RwLock<Inner>,
}

impl InMemoryAccessLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessLedger for InMemoryAccessLedger {
    async fn record_access(&self, key: &Key, at: Timestamp) -> OrcaResult<()> {
        self.inner
            .write()
            .await
            .update(key, |record| record.touch(at));
        Ok(())
    }

    async fn record_store(&self, key: &Key, at: Timestamp) -> OrcaResult<()> {
        self.inner
            .write()
            .await
            .upsert(key, at, |record| record.touch_store(at));
        Ok(())
    }

    async fn record(&self, key: &Key) -> OrcaResult<Option<AccessRecord>> {
        Ok(self.inner.read().await.records.get(key).cloned())
    }

    async fn coldest_keys(&self, n: usize) -> OrcaResult<Vec<Key>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ranked
            .iter()
            .take(n)
            .map(|(_, _, key)| key.clone())
            .collect())
    }

    async fn forget(&self, key: &Key) -> OrcaResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.remove(key) {
            inner
                .ranked
                .remove(&(record.last_accessed_at, record.access_count, record.key));
        }
        Ok(())
    }

    async fn clear(&self) -> OrcaResult<()> {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.ranked.clear();
        Ok(())
    }

    async fn len(&self) -> OrcaResult<usize> {
        Ok(self.inner.read().await.records.len())
    }
}

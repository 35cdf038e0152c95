//! Process-local storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use orca_core::{EntityType, Key, OrcaError, OrcaResult};
use tokio::sync::RwLock;

use super::Storage;
use crate::adapter::EntityAdapter;

/// In-memory storage. Records live in a map and vanish with the process.
///
/// Records still go through the adapter, so references to other entity types
/// are resolved on every `get` exactly as with a durable backend.
pub struct InMemoryStorage<A: EntityAdapter> {
    adapter: A,
    records: RwLock<HashMap<Key, A::Record>>,
}

impl<A: EntityAdapter> InMemoryStorage<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

#[async_trait]
impl<A: EntityAdapter> Storage<A::Entity> for InMemoryStorage<A> {
    fn entity_type(&self) -> EntityType {
        self.adapter.entity_type()
    }

    async fn store(&self, key: &Key, value: &A::Entity) -> OrcaResult<()> {
        let record = self.adapter.to_record(key, value)?;
        self.records.write().await.insert(key.clone(), record);
        Ok(())
    }

    async fn contains(&self, key: &Key) -> OrcaResult<bool> {
        Ok(self.records.read().await.contains_key(key))
    }

    async fn get(&self, key: &Key) -> OrcaResult<A::Entity> {
        // Resolution may hit other caches; don't hold the lock across it.
        let record = self
            .records
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| OrcaError::not_found(self.adapter.entity_type(), key.clone()))?;
        Ok(self.adapter.from_record(key, record).await?)
    }

    async fn remove(&self, key: &Key) -> OrcaResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> OrcaResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> OrcaResult<usize> {
        Ok(self.records.read().await.len())
    }
}

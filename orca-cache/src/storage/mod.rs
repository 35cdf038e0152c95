//! Storage backends holding the records of one entity type.
//!
//! A backend translates between entities and records through its
//! [`EntityAdapter`](crate::EntityAdapter), so callers only ever see domain
//! objects. Every backend owns exactly one entity type: keys are unique within
//! it, and two backends never share records.

mod lmdb;
mod memory;

pub(crate) use lmdb::lmdb_key;
pub use lmdb::{LmdbEnvironment, LmdbError, LmdbOptions, LmdbStorage};
pub use memory::InMemoryStorage;

use async_trait::async_trait;
use orca_core::{EntityType, Key, OrcaResult};

/// Key/value persistence for a single entity type.
///
/// # Implementation Requirements
///
/// - `get` of an absent key fails with `OrcaError::NotFound`, never another
///   error kind
/// - `remove` of an absent key succeeds
/// - `store` overwrites; afterwards `get` yields an equivalent entity
/// - durable backends keep their records across process restarts
#[async_trait]
pub trait Storage<T>: Send + Sync {
    /// Entity type whose records this backend holds.
    fn entity_type(&self) -> EntityType;

    /// Insert or overwrite the record for `key`.
    async fn store(&self, key: &Key, value: &T) -> OrcaResult<()>;

    /// Whether a record exists for `key`.
    async fn contains(&self, key: &Key) -> OrcaResult<bool>;

    /// Load and translate the record for `key`.
    async fn get(&self, key: &Key) -> OrcaResult<T>;

    /// Delete the record for `key` if present.
    async fn remove(&self, key: &Key) -> OrcaResult<()>;

    /// Delete every record.
    async fn clear(&self) -> OrcaResult<()>;

    /// Number of stored records.
    async fn len(&self) -> OrcaResult<usize>;

    async fn is_empty(&self) -> OrcaResult<bool> {
        Ok(self.len().await? == 0)
    }
}

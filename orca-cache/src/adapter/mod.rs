//! Translation between domain entities and persisted records.
//!
//! Storage backends never see domain objects: they persist an adapter's
//! `Record`, which references other entity types by [`Key`] only. Turning a
//! record back into an entity may resolve those keys through other caches,
//! so adapters form a dependency graph across entity types. That graph must
//! stay acyclic: profiles depend on nothing, posts depend on profiles.

mod post;
mod profile;

pub use post::{PostAdapter, PostRecord};
pub use profile::{ProfileAdapter, ProfileRecord};

use async_trait::async_trait;
use orca_core::{AdapterError, EntityType, Key};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Per-entity-type translation between domain objects and storage records.
///
/// # Implementation Requirements
///
/// - `entity_type()` must return the same value for the adapter's lifetime
/// - `from_record` must fail as a whole when a referenced entity cannot be
///   resolved; it never returns a partially populated entity
/// - `Record` must be self-contained apart from keys of other entity types
#[async_trait]
pub trait EntityAdapter: Send + Sync + 'static {
    type Entity: Clone + Send + Sync + 'static;
    type Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn entity_type(&self) -> EntityType;

    /// Build the persisted record for `entity`, stored under `key`.
    fn to_record(&self, key: &Key, entity: &Self::Entity) -> Result<Self::Record, AdapterError>;

    /// Rebuild the entity stored under `key`, resolving references.
    async fn from_record(
        &self,
        key: &Key,
        record: Self::Record,
    ) -> Result<Self::Entity, AdapterError>;
}

/// Adapter for values whose domain form is already their persisted form.
pub struct IdentityAdapter<T> {
    entity_type: EntityType,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IdentityAdapter<T> {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for IdentityAdapter<T> {
    fn clone(&self) -> Self {
        Self::new(self.entity_type)
    }
}

#[async_trait]
impl<T> EntityAdapter for IdentityAdapter<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Entity = T;
    type Record = T;

    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn to_record(&self, _key: &Key, entity: &T) -> Result<T, AdapterError> {
        Ok(entity.clone())
    }

    async fn from_record(&self, _key: &Key, record: T) -> Result<T, AdapterError> {
        Ok(record)
    }
}

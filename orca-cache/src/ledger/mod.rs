//! Access ledger: per-key recency bookkeeping used to pick eviction victims.
//!
//! The ledger holds one [`AccessRecord`] per stored key. Keys are ranked by
//! `(last_accessed_at, access_count, key)` ascending, so the coldest key is the
//! one untouched for longest, with the least-used and then the byte-wise
//! smallest key breaking ties.

mod lmdb;
mod memory;

pub use lmdb::LmdbAccessLedger;
pub use memory::InMemoryAccessLedger;

use async_trait::async_trait;
use orca_core::{Key, OrcaResult, Timestamp};
use serde::{Deserialize, Serialize};

/// Access bookkeeping for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub key: Key,
    /// Most recent read or write.
    pub last_accessed_at: Timestamp,
    /// Reads and writes so far. Saturates instead of wrapping.
    pub access_count: u64,
    /// Most recent write, used for time-to-live expiry.
    pub stored_at: Timestamp,
}

impl AccessRecord {
    /// Record for a key first seen at `at`.
    pub fn new(key: Key, at: Timestamp) -> Self {
        Self {
            key,
            last_accessed_at: at,
            access_count: 1,
            stored_at: at,
        }
    }

    /// Count a read at `at`. `last_accessed_at` never moves backwards.
    pub fn touch(&mut self, at: Timestamp) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = self.last_accessed_at.max(at);
    }

    /// Count a write at `at`.
    pub fn touch_store(&mut self, at: Timestamp) {
        self.touch(at);
        self.stored_at = self.stored_at.max(at);
    }

    /// Eviction rank; smaller is colder.
    pub fn rank(&self) -> (Timestamp, u64, &Key) {
        (self.last_accessed_at, self.access_count, &self.key)
    }
}

/// Per-entity-type access bookkeeping.
///
/// # Implementation Requirements
///
/// - a key's `access_count` increases by exactly one per recorded access,
///   even under concurrent recording
/// - `coldest_keys` orders by `(last_accessed_at, access_count, key)`
///   ascending and never returns more keys than exist
/// - `forget` of an unknown key succeeds
/// - only `record_store` creates records; a read racing a removal must not
///   bring a forgotten key back
#[async_trait]
pub trait AccessLedger: Send + Sync {
    /// Record a read of `key` at `at`. Does nothing if `key` has no record.
    async fn record_access(&self, key: &Key, at: Timestamp) -> OrcaResult<()>;

    /// Record a write of `key` at `at`, creating the record if needed.
    async fn record_store(&self, key: &Key, at: Timestamp) -> OrcaResult<()>;

    /// Current record for `key`.
    async fn record(&self, key: &Key) -> OrcaResult<Option<AccessRecord>>;

    /// Up to `n` keys, coldest first.
    async fn coldest_keys(&self, n: usize) -> OrcaResult<Vec<Key>>;

    /// Drop the record for `key`.
    async fn forget(&self, key: &Key) -> OrcaResult<()>;

    /// Drop every record.
    async fn clear(&self) -> OrcaResult<()>;

    /// Number of keys with a record.
    async fn len(&self) -> OrcaResult<usize>;
}

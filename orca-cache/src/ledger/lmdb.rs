//! LMDB-backed access ledger.

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env};
use orca_core::{Key, OrcaResult, Timestamp};

use super::{AccessLedger, AccessRecord};
use crate::storage::{lmdb_key, LmdbError};

/// Ledger persisted next to its entity type's records, so recency ordering
/// survives restarts.
///
/// Updates are a read-modify-write inside one LMDB write transaction, and
/// LMDB serializes writers, so concurrent accesses are never lost.
pub struct LmdbAccessLedger {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbAccessLedger {
    pub(crate) fn new(env: Env, db: Database<Bytes, Bytes>) -> Self {
        Self { env, db }
    }

    /// Read-modify-write the record for `key` in one write transaction.
    /// Absent records are created at `create_at`, or left absent if it is
    /// `None`.
    fn modify(
        &self,
        key: &Key,
        create_at: Option<Timestamp>,
        update: impl FnOnce(&mut AccessRecord),
    ) -> Result<(), LmdbError> {
        let db_key = lmdb_key(key);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        let existing = match self.db.get(&wtxn, db_key.as_slice()).map_err(LmdbError::txn)? {
            Some(bytes) => Some(serde_json::from_slice::<AccessRecord>(bytes).map_err(LmdbError::decode)?),
            None => None,
        };
        let record = match (existing, create_at) {
            (Some(mut record), _) => {
                update(&mut record);
                record
            }
            (None, Some(at)) => AccessRecord::new(key.clone(), at),
            // Dropping the transaction aborts it.
            (None, None) => return Ok(()),
        };
        let bytes = serde_json::to_vec(&record).map_err(LmdbError::encode)?;
        self.db
            .put(&mut wtxn, db_key.as_slice(), bytes.as_slice())
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)
    }

    fn read(&self, key: &Key) -> Result<Option<AccessRecord>, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let bytes = self.db.get(&rtxn, lmdb_key(key).as_slice()).map_err(LmdbError::txn)?;
        let record = match bytes {
            Some(bytes) => Some(serde_json::from_slice(bytes).map_err(LmdbError::decode)?),
            None => None,
        };
        Ok(record)
    }

    fn ranked(&self) -> Result<Vec<AccessRecord>, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let mut records = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(LmdbError::txn)? {
            let (_, bytes) = entry.map_err(LmdbError::txn)?;
            records.push(serde_json::from_slice::<AccessRecord>(bytes).map_err(LmdbError::decode)?);
        }
        records.sort_by(|a, b| a.rank().cmp(&b.rank()));
        Ok(records)
    }

    fn delete(&self, key: &Key) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        self.db
            .delete(&mut wtxn, lmdb_key(key).as_slice())
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)
    }

    fn delete_all(&self) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        self.db.clear(&mut wtxn).map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)
    }

    fn count(&self) -> Result<usize, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let count = self.db.len(&rtxn).map_err(LmdbError::txn)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl AccessLedger for LmdbAccessLedger {
    async fn record_access(&self, key: &Key, at: Timestamp) -> OrcaResult<()> {
        Ok(self.modify(key, None, |record| record.touch(at))?)
    }

    async fn record_store(&self, key: &Key, at: Timestamp) -> OrcaResult<()> {
        Ok(self.modify(key, Some(at), |record| record.touch_store(at))?)
    }

    async fn record(&self, key: &Key) -> OrcaResult<Option<AccessRecord>> {
        Ok(self.read(key)?)
    }

    async fn coldest_keys(&self, n: usize) -> OrcaResult<Vec<Key>> {
        Ok(self
            .ranked()?
            .into_iter()
            .take(n)
            .map(|record| record.key)
            .collect())
    }

    async fn forget(&self, key: &Key) -> OrcaResult<()> {
        Ok(self.delete(key)?)
    }

    async fn clear(&self) -> OrcaResult<()> {
        Ok(self.delete_all()?)
    }

    async fn len(&self) -> OrcaResult<usize> {
        Ok(self.count()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LmdbEnvironment, LmdbOptions};
    use chrono::Duration;
    use orca_core::EntityType;
    use tempfile::TempDir;

    fn at(secs: i64) -> Timestamp {
        Timestamp::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn open(dir: &TempDir) -> LmdbEnvironment {
        LmdbEnvironment::open(&LmdbOptions::new(dir.path()).with_map_size_mb(10))
            .expect("Failed to open environment")
    }

    #[tokio::test]
    async fn test_lmdb_ledger_ranks_and_counts() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let ledger = open(&dir)
            .ledger(EntityType::Profile)
            .expect("Failed to open ledger");

        ledger.record_store(&Key::from("a"), at(1)).await.expect("record should succeed");
        ledger.record_store(&Key::from("b"), at(2)).await.expect("record should succeed");
        ledger.record_access(&Key::from("a"), at(3)).await.expect("record should succeed");

        let a = ledger
            .record(&Key::from("a"))
            .await
            .expect("record should succeed")
            .expect("record should exist");
        assert_eq!(a.access_count, 2);
        assert_eq!(a.last_accessed_at, at(3));
        assert_eq!(a.stored_at, at(1));

        assert_eq!(
            ledger.coldest_keys(1).await.expect("coldest_keys should succeed"),
            vec![Key::from("b")]
        );

        ledger.forget(&Key::from("b")).await.expect("forget should succeed");
        assert_eq!(ledger.len().await.expect("len should succeed"), 1);
        ledger.clear().await.expect("clear should succeed");
        assert_eq!(ledger.len().await.expect("len should succeed"), 0);
    }

    #[tokio::test]
    async fn test_lmdb_ledger_survives_reopen() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        {
            let ledger = open(&dir)
                .ledger(EntityType::Post)
                .expect("Failed to open ledger");
            ledger.record_store(&Key::from("old"), at(1)).await.expect("record should succeed");
            ledger.record_store(&Key::from("new"), at(2)).await.expect("record should succeed");
        }

        let ledger = open(&dir)
            .ledger(EntityType::Post)
            .expect("Failed to reopen ledger");
        assert_eq!(
            ledger.coldest_keys(2).await.expect("coldest_keys should succeed"),
            vec![Key::from("old"), Key::from("new")]
        );
    }

    #[tokio::test]
    async fn test_lmdb_access_does_not_create_records() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let ledger = open(&dir)
            .ledger(EntityType::Profile)
            .expect("Failed to open ledger");
        let key = Key::from("gone");

        ledger.record_access(&key, at(1)).await.expect("record should succeed");
        assert_eq!(ledger.record(&key).await.expect("record should succeed"), None);

        ledger.record_store(&key, at(2)).await.expect("record should succeed");
        ledger.forget(&key).await.expect("forget should succeed");
        ledger.record_access(&key, at(3)).await.expect("record should succeed");
        assert_eq!(ledger.len().await.expect("len should succeed"), 0);
    }

    #[tokio::test]
    async fn test_lmdb_ledger_keeps_long_keys() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let ledger = open(&dir)
            .ledger(EntityType::Profile)
            .expect("Failed to open ledger");
        let long = Key::from("x".repeat(2048));

        ledger.record_store(&Key::from(""), at(1)).await.expect("record should succeed");
        ledger.record_store(&long, at(2)).await.expect("record should succeed");

        assert_eq!(
            ledger.coldest_keys(2).await.expect("coldest_keys should succeed"),
            vec![Key::from(""), long]
        );
    }
}

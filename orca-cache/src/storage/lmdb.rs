//! LMDB-backed durable storage.
//!
//! Uses the heed crate (Rust bindings for LMDB). One [`LmdbEnvironment`] is
//! opened per directory and shared by every entity type: each type gets its
//! own named database for records (`profiles`, `posts`) and one for its
//! access ledger (`profiles.access`, `posts.access`).
//!
//! Records are stored as JSON under [`lmdb_key`]. Transactions are
//! opened and committed inside synchronous helpers so none is ever held
//! across an `.await`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use orca_core::{
    CacheConfig, ConfigError, EntityType, Key, OrcaError, OrcaResult, StorageError,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::Storage;
use crate::adapter::EntityAdapter;
use crate::cache::EntityCache;
use crate::ledger::LmdbAccessLedger;

/// Error type for LMDB storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a named database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbError {
    pub(crate) fn txn(e: heed::Error) -> Self {
        Self::Transaction(e.to_string())
    }

    pub(crate) fn encode(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }

    pub(crate) fn decode(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

impl From<LmdbError> for OrcaError {
    fn from(e: LmdbError) -> Self {
        let storage = match e {
            LmdbError::EnvOpen(_) | LmdbError::DbOpen { .. } => StorageError::Environment {
                reason: e.to_string(),
            },
            LmdbError::Transaction(reason) => StorageError::Transaction { reason },
            LmdbError::Serialization(reason) | LmdbError::Deserialization(reason) => {
                StorageError::Serialization { reason }
            }
            LmdbError::Io(io) => StorageError::Io {
                operation: "create_dir".to_string(),
                reason: io.to_string(),
            },
        };
        OrcaError::Storage(storage)
    }
}

// ============================================================================
// KEYS
// ============================================================================

/// Largest key LMDB accepts with its default page size.
const MAX_KEY_BYTES: usize = 511;

const RAW_KEY: u8 = b'k';
const DIGEST_KEY: u8 = b'h';

/// LMDB key under which `key` is stored.
///
/// Every key gets a one-byte tag, so the empty key is still a valid LMDB key.
/// Keys too long for LMDB are stored under their SHA-256 digest instead.
pub(crate) fn lmdb_key(key: &Key) -> Vec<u8> {
    let raw = key.as_bytes();
    if raw.len() < MAX_KEY_BYTES {
        let mut encoded = Vec::with_capacity(raw.len() + 1);
        encoded.push(RAW_KEY);
        encoded.extend_from_slice(raw);
        encoded
    } else {
        let mut encoded = Vec::with_capacity(33);
        encoded.push(DIGEST_KEY);
        encoded.extend_from_slice(&Sha256::digest(raw));
        encoded
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Where and how large the LMDB environment is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbOptions {
    /// Directory holding the LMDB files. Created if missing.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub map_size_mb: usize,
    /// Maximum number of named databases. Each entity type needs two.
    pub max_dbs: u32,
}

impl Default for LmdbOptions {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("orca-cache"),
            map_size_mb: 64,
            max_dbs: 8,
        }
    }
}

impl LmdbOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    pub fn with_max_dbs(mut self, max_dbs: u32) -> Self {
        self.max_dbs = max_dbs;
        self
    }

    /// Create options from environment variables.
    ///
    /// Environment variables:
    /// - `ORCA_CACHE_DIR`: LMDB directory (default: `$TMPDIR/orca-cache`)
    /// - `ORCA_CACHE_MAP_SIZE_MB`: Map size in megabytes (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Ok(dir) = std::env::var("ORCA_CACHE_DIR") {
            if !dir.trim().is_empty() {
                options.path = PathBuf::from(dir.trim());
            }
        }
        if let Ok(raw) = std::env::var("ORCA_CACHE_MAP_SIZE_MB") {
            let raw = raw.trim();
            if !raw.is_empty() {
                options.map_size_mb = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "ORCA_CACHE_MAP_SIZE_MB".to_string(),
                    value: raw.to_string(),
                    reason: "not a non-negative integer".to_string(),
                })?;
            }
        }
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_dbs < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_dbs".to_string(),
                value: self.max_dbs.to_string(),
                reason: "need room for at least one record and one ledger database".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Open LMDB environment shared by every durable cache of a process.
///
/// Cheap to clone. LMDB refuses to open the same directory twice within a
/// process, so open it once and hand out clones.
#[derive(Clone)]
pub struct LmdbEnvironment {
    env: Env,
}

impl LmdbEnvironment {
    /// Open (creating if needed) the environment described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The LMDB environment cannot be opened
    pub fn open(options: &LmdbOptions) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(&options.path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size_mb * 1024 * 1024)
                .max_dbs(options.max_dbs)
                .open(&options.path)
        }
        .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

        info!(path = %options.path.display(), map_size_mb = options.map_size_mb, "Opened LMDB environment");
        Ok(Self { env })
    }

    fn database(&self, name: &str) -> Result<Database<Bytes, Bytes>, LmdbError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        let db: Database<Bytes, Bytes> = self
            .env
            .create_database(&mut wtxn, Some(name))
            .map_err(|e| LmdbError::DbOpen {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(LmdbError::txn)?;
        debug!(database = name, "Opened LMDB database");
        Ok(db)
    }

    /// Durable storage for the adapter's entity type.
    pub fn storage<A: EntityAdapter>(&self, adapter: A) -> Result<LmdbStorage<A>, LmdbError> {
        let db = self.database(adapter.entity_type().table_name())?;
        Ok(LmdbStorage {
            env: self.env.clone(),
            db,
            adapter,
        })
    }

    /// Durable access ledger for `entity_type`.
    pub fn ledger(&self, entity_type: EntityType) -> Result<LmdbAccessLedger, LmdbError> {
        let db = self.database(entity_type.ledger_name())?;
        Ok(LmdbAccessLedger::new(self.env.clone(), db))
    }

    /// Durable cache for the adapter's entity type: LMDB storage paired with
    /// an LMDB access ledger, so recency survives restarts along with data.
    pub fn cache<A: EntityAdapter>(
        &self,
        adapter: A,
        config: CacheConfig,
    ) -> OrcaResult<EntityCache<A::Entity, LmdbStorage<A>, LmdbAccessLedger>> {
        let entity_type = adapter.entity_type();
        let storage = self.storage(adapter)?;
        let ledger = self.ledger(entity_type)?;
        EntityCache::new(storage, ledger, config)
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// LMDB-backed storage for one entity type.
pub struct LmdbStorage<A: EntityAdapter> {
    env: Env,
    db: Database<Bytes, Bytes>,
    adapter: A,
}

impl<A: EntityAdapter> LmdbStorage<A> {
    /// Open storage in its own environment at `path`.
    ///
    /// Only one environment may exist per directory; use
    /// [`LmdbEnvironment`] when several entity types share a directory.
    pub fn open<P: AsRef<Path>>(path: P, map_size_mb: usize, adapter: A) -> Result<Self, LmdbError> {
        let options = LmdbOptions::new(path.as_ref()).with_map_size_mb(map_size_mb);
        LmdbEnvironment::open(&options)?.storage(adapter)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn read_record(&self, key: &Key) -> Result<Option<A::Record>, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let bytes = self.db.get(&rtxn, lmdb_key(key).as_slice()).map_err(LmdbError::txn)?;
        let record = match bytes {
            Some(bytes) => Some(serde_json::from_slice(bytes).map_err(LmdbError::decode)?),
            None => None,
        };
        Ok(record)
    }

    fn write_record(&self, key: &Key, record: &A::Record) -> Result<(), LmdbError> {
        let bytes = serde_json::to_vec(record).map_err(LmdbError::encode)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        self.db
            .put(&mut wtxn, lmdb_key(key).as_slice(), bytes.as_slice())
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)
    }

    fn has_record(&self, key: &Key) -> Result<bool, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let found = self
            .db
            .get(&rtxn, lmdb_key(key).as_slice())
            .map_err(LmdbError::txn)?
            .is_some();
        Ok(found)
    }

    fn delete_record(&self, key: &Key) -> Result<bool, LmdbError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        let deleted = self
            .db
            .delete(&mut wtxn, lmdb_key(key).as_slice())
            .map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)?;
        Ok(deleted)
    }

    fn clear_records(&self) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::txn)?;
        self.db.clear(&mut wtxn).map_err(LmdbError::txn)?;
        wtxn.commit().map_err(LmdbError::txn)
    }

    fn count_records(&self) -> Result<usize, LmdbError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::txn)?;
        let count = self.db.len(&rtxn).map_err(LmdbError::txn)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl<A: EntityAdapter> Storage<A::Entity> for LmdbStorage<A> {
    fn entity_type(&self) -> EntityType {
        self.adapter.entity_type()
    }

    async fn store(&self, key: &Key, value: &A::Entity) -> OrcaResult<()> {
        let record = self.adapter.to_record(key, value)?;
        self.write_record(key, &record)?;
        Ok(())
    }

    async fn contains(&self, key: &Key) -> OrcaResult<bool> {
        Ok(self.has_record(key)?)
    }

    async fn get(&self, key: &Key) -> OrcaResult<A::Entity> {
        let record = self
            .read_record(key)?
            .ok_or_else(|| OrcaError::not_found(self.adapter.entity_type(), key.clone()))?;
        Ok(self.adapter.from_record(key, record).await?)
    }

    async fn remove(&self, key: &Key) -> OrcaResult<()> {
        if self.delete_record(key)? {
            debug!(entity_type = %self.adapter.entity_type(), key = %key, "Removed LMDB record");
        }
        Ok(())
    }

    async fn clear(&self) -> OrcaResult<()> {
        self.clear_records()?;
        Ok(())
    }

    async fn len(&self) -> OrcaResult<usize> {
        Ok(self.count_records()?)
    }
}

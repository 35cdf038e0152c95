//! Error types for Orca cache operations

use crate::{EntityType, Key};
use thiserror::Error;

/// Persistence backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O failed during {operation}: {reason}")]
    Io { operation: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage environment unavailable: {reason}")]
    Environment { reason: String },

    #[error("Storage task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Failures of a caller-supplied fetch function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch failed for {key}: {reason}")]
    Failed { key: Key, reason: String },

    #[error("Source has no value for {key}")]
    Unavailable { key: Key },
}

impl FetchError {
    /// Create a `Failed` error.
    pub fn failed(key: impl Into<Key>, reason: impl Into<String>) -> Self {
        Self::Failed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an `Unavailable` error.
    pub fn unavailable(key: impl Into<Key>) -> Self {
        Self::Unavailable { key: key.into() }
    }

    /// Key whose fetch failed.
    pub fn key(&self) -> &Key {
        match self {
            Self::Failed { key, .. } | Self::Unavailable { key } => key,
        }
    }
}

/// Translation errors between domain objects and storage records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Encoding {entity_type} {key} failed: {reason}")]
    Encode {
        entity_type: EntityType,
        key: Key,
        reason: String,
    },

    #[error("Decoding {entity_type} {key} failed: {reason}")]
    Decode {
        entity_type: EntityType,
        key: Key,
        reason: String,
    },

    #[error("Unknown {field} for {entity_type} {key}: {value}")]
    UnknownVariant {
        entity_type: EntityType,
        key: Key,
        field: String,
        value: String,
    },

    #[error(
        "{entity_type} {key} references {reference_type} {reference_key} which could not be resolved: {reason}"
    )]
    UnresolvedReference {
        entity_type: EntityType,
        key: Key,
        reference_type: EntityType,
        reference_key: Key,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Orca cache errors.
///
/// Every variant is `Clone` so a single fetch outcome can be handed to all
/// coalesced waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrcaError {
    #[error("{entity_type} not found: {key}")]
    NotFound { entity_type: EntityType, key: Key },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl OrcaError {
    /// Create a `NotFound` error.
    pub fn not_found(entity_type: EntityType, key: impl Into<Key>) -> Self {
        Self::NotFound {
            entity_type,
            key: key.into(),
        }
    }

    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for Orca operations.
pub type OrcaResult<T> = Result<T, OrcaError>;

// =============================================================================
// TESTS
// =============================================================================

//! Cache configuration

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy knobs for an entity cache.
///
/// Everything is optional: the default cache is unbounded and never expires
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of stored entries before the coldest are evicted.
    /// This is a soft bound: keys with in-flight fetches are never evicted.
    pub capacity: Option<usize>,
    /// Entries not read or written for this long are treated as absent.
    pub time_to_idle: Option<Duration>,
    /// Entries not written for this long are treated as absent.
    pub time_to_live: Option<Duration>,
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of stored entries.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the time-to-idle.
    pub fn with_time_to_idle(mut self, duration: Duration) -> Self {
        self.time_to_idle = Some(duration);
        self
    }

    /// Set the time-to-live.
    pub fn with_time_to_live(mut self, duration: Duration) -> Self {
        self.time_to_live = Some(duration);
        self
    }

    /// Whether any expiry policy is active.
    pub fn expires(&self) -> bool {
        self.time_to_idle.is_some() || self.time_to_live.is_some()
    }

    /// Reject zero capacities and zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "capacity".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, duration) in [
            ("time_to_idle", self.time_to_idle),
            ("time_to_live", self.time_to_live),
        ] {
            if duration == Some(Duration::ZERO) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0s".to_string(),
                    reason: "must be a positive duration".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Create a CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ORCA_CACHE_CAPACITY`: Maximum stored entries (default: unbounded)
    /// - `ORCA_CACHE_TIME_TO_IDLE_SECS`: Idle expiry in seconds (default: none)
    /// - `ORCA_CACHE_TIME_TO_LIVE_SECS`: Write expiry in seconds (default: none)
    ///
    /// Unparseable values are reported rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            capacity: parse_env("ORCA_CACHE_CAPACITY")?,
            time_to_idle: parse_env::<u64>("ORCA_CACHE_TIME_TO_IDLE_SECS")?
                .map(Duration::from_secs),
            time_to_live: parse_env::<u64>("ORCA_CACHE_TIME_TO_LIVE_SECS")?
                .map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        value: raw.to_string(),
        reason: "not a non-negative integer".to_string(),
    })
}

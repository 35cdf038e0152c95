//! Orca Core - Entity Cache Types
//!
//! Pure data structures and collaborator traits shared by every Orca crate.
//! This crate performs no I/O: storage backends, the access ledger and the
//! cache façade live in `orca-cache`.

pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod fetch;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entities::{Author, Content, Follow, Headline, Post, Profile, ProfileKind};
pub use error::{
    AdapterError, ConfigError, FetchError, OrcaError, OrcaResult, StorageError,
};
pub use fetch::{fetch_fn, FetchFn, Fetcher, Resolver};
pub use identity::{EntityType, Key, Timestamp};

//! Orca Cache - Generic Entity Cache
//!
//! Sits between remote data sources and repository-level callers. Each entity
//! type gets its own [`EntityCache`], composed of:
//!
//! - a [`Storage`] backend (in-memory or LMDB) that persists records through an
//!   [`EntityAdapter`],
//! - an [`AccessLedger`] ranking keys by recency for eviction,
//! - a private single-flight map so concurrent misses of one key share a
//!   single fetch.
//!
//! Entities reference other entity types by key. A post's adapter resolves its
//! author through the profile cache via [`Resolver`](orca_core::Resolver), so
//! profiles are never duplicated inside post records.
//!
//! # Example
//!
//! ```ignore
//! let env = LmdbEnvironment::open(&LmdbOptions::from_env()?)?;
//! let profiles = env.cache(ProfileAdapter, CacheConfig::new().with_capacity(500))?;
//! let posts = env.cache(
//!     PostAdapter::new(Arc::new(profiles.resolver_with(profile_fetcher.clone()))),
//!     CacheConfig::new().with_capacity(2_000),
//! )?;
//!
//! let post = posts.get_or_fetch(&key, post_fetcher).await?;
//! ```

pub mod adapter;
pub mod cache;
mod flight;
pub mod ledger;
pub mod resolver;
pub mod stats;
pub mod storage;

pub use adapter::{
    EntityAdapter, IdentityAdapter, PostAdapter, PostRecord, ProfileAdapter, ProfileRecord,
};
pub use cache::EntityCache;
pub use ledger::{AccessLedger, AccessRecord, InMemoryAccessLedger, LmdbAccessLedger};
pub use resolver::CacheResolver;
pub use stats::CacheStats;
pub use storage::{InMemoryStorage, LmdbEnvironment, LmdbError, LmdbOptions, LmdbStorage, Storage};

//! Disk-backed media cache with TTL expiration and LRU eviction
//!
//! Cached blobs live as flat files named by a hex digest of their logical key.
//! Sizes and access times are tracked in an in-memory index that is rebuilt
//! from the directory on [`MediaCache::initialize`]. A maintenance pass first
//! expires entries older than the TTL, then evicts least-recently-used entries
//! until the cache drops below its eviction target.

mod cache;
mod config;
mod error;
mod eviction;
mod index;
mod key;
mod locks;
mod store;
mod types;

pub use cache::MediaCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use eviction::{EvictionPolicy, PassOutcome};
pub use index::{IndexEntry, MetadataIndex};
pub use key::{derive_cache_key, is_cache_key, CACHE_KEY_LEN};
pub use locks::KeyLocks;
pub use store::{CacheStore, StoredFile};
pub use types::{CacheStats, MaintenanceResult};

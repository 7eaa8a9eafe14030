//! The media cache: per-key operations and maintenance passes

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::eviction::{expiry_cutoff, EvictionPolicy};
use crate::index::MetadataIndex;
use crate::key::derive_cache_key;
use crate::locks::KeyLocks;
use crate::store::CacheStore;
use crate::types::{CacheStats, MaintenanceResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A disk-backed blob cache with in-memory metadata.
///
/// A file change and its index update happen under the key's lock, so
/// operations on one key are ordered while different keys proceed in parallel.
/// Only eviction passes are serialized, and a maintenance call that finds
/// another one in progress returns immediately with `skipped` set.
pub struct MediaCache {
    config: CacheConfig,
    store: CacheStore,
    index: MetadataIndex,
    locks: KeyLocks,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
    maintenance_lock: Mutex<()>,
    eviction_lock: Mutex<()>,
    closed: AtomicBool,
}

impl MediaCache {
    /// Create a new cache; call [`initialize`](Self::initialize) before use
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: CacheStore::new(config.cache_dir.clone()),
            config,
            index: MetadataIndex::new(),
            locks: KeyLocks::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            maintenance_lock: Mutex::new(()),
            eviction_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Create the cache directory and rebuild the index from the files in it
    pub async fn initialize(&self) -> Result<()> {
        self.config.validate()?;
        self.store.ensure_directory().await?;

        let leftovers = self.store.remove_temp_files().await?;
        if leftovers > 0 {
            warn!(files = leftovers, "Removed incomplete cache writes");
        }

        self.index.clear();
        for file in self.store.list_all().await? {
            self.index.record_put(&file.key, file.size, file.modified);
        }

        info!(
            cache_dir = ?self.config.cache_dir,
            files = self.index.len(),
            total_size = self.index.total_size(),
            "Cache initialized"
        );
        Ok(())
    }

    /// Stop accepting new entries and wait for any running maintenance pass
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let _maintenance = self.maintenance_lock.lock().await;
        info!(
            files = self.index.len(),
            total_size = self.index.total_size(),
            "Cache shut down"
        );
    }

    /// Copy `source` into the cache under `logical_key`.
    ///
    /// The file is fully written before the index is touched, so a failed or
    /// cancelled put leaves the cache as it was.
    pub async fn put(&self, logical_key: &str, source: &Path) -> Result<()> {
        self.ensure_open()?;
        let key = derive_cache_key(logical_key);

        {
            let _guard = self.locks.lock(&key).await;
            let size = match self.store.write(&key, source).await {
                Ok(size) => size,
                Err(e) => {
                    warn!(key = %logical_key, source = ?source, error = %e, "Failed to cache file");
                    return Err(e);
                }
            };
            self.record_put(logical_key, &key, size);
        }

        self.evict_if_over_cap().await;
        Ok(())
    }

    /// Store `data` in the cache under `logical_key`
    pub async fn put_bytes(&self, logical_key: &str, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let key = derive_cache_key(logical_key);

        {
            let _guard = self.locks.lock(&key).await;
            let size = match self.store.write_bytes(&key, data).await {
                Ok(size) => size,
                Err(e) => {
                    warn!(key = %logical_key, error = %e, "Failed to cache blob");
                    return Err(e);
                }
            };
            self.record_put(logical_key, &key, size);
        }

        self.evict_if_over_cap().await;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn record_put(&self, logical_key: &str, key: &str, size: u64) {
        // A new entry counts as accessed now, so it is the last LRU candidate
        self.index.record_put(key, size, Utc::now());
        debug!(key = %logical_key, cache_key = %key, size, "Cached file");
    }

    /// Must be called without holding any key lock
    async fn evict_if_over_cap(&self) {
        if self.index.total_size() <= self.config.max_cache_size {
            return;
        }
        // Another eviction is already driving the size down
        let Ok(_evicting) = self.eviction_lock.try_lock() else {
            debug!("Eviction already in progress");
            return;
        };
        EvictionPolicy::new(&self.store, &self.index, &self.locks)
            .evict_lru(self.config.max_cache_size, self.config.eviction_target())
            .await;
    }

    /// Look up `logical_key`, returning the path of the cached file on a hit.
    ///
    /// Missing files drop their stale index entry; files older than the TTL are
    /// deleted. Either way the lookup is a miss. A file found on disk without
    /// an index entry is indexed by the hit.
    pub async fn get(&self, logical_key: &str) -> Option<PathBuf> {
        let key = derive_cache_key(logical_key);
        let _guard = self.locks.lock(&key).await;

        let Some(file) = self.store.read(&key).await else {
            if self.index.remove(&key).is_some() {
                debug!(key = %logical_key, "Dropped index entry for missing file");
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let expired = expiry_cutoff(self.config.ttl()).is_some_and(|c| file.modified < c);
        if expired {
            debug!(key = %logical_key, modified = %file.modified, "Cache entry expired");
            self.store.delete(&key).await;
            self.index.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if !self.index.record_access(&key, Utc::now()) {
            self.index.record_put(&key, file.size, Utc::now());
            debug!(key = %logical_key, size = file.size, "Indexed untracked cache file");
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %logical_key, "Cache hit");
        Some(file.path)
    }

    /// Remove `logical_key` from disk and index
    pub async fn remove(&self, logical_key: &str) {
        let key = derive_cache_key(logical_key);
        let _guard = self.locks.lock(&key).await;
        let deleted = self.store.delete(&key).await;
        let indexed = self.index.remove(&key);
        if deleted || indexed.is_some() {
            debug!(key = %logical_key, "Removed cache entry");
        }
    }

    /// Whether `logical_key` is indexed; does not count as an access
    pub fn contains(&self, logical_key: &str) -> bool {
        self.index.contains(&derive_cache_key(logical_key))
    }

    pub fn file_size(&self, logical_key: &str) -> Option<u64> {
        self.index
            .get(&derive_cache_key(logical_key))
            .map(|entry| entry.size)
    }

    pub fn last_access_time(&self, logical_key: &str) -> Option<DateTime<Utc>> {
        self.index
            .get(&derive_cache_key(logical_key))
            .map(|entry| entry.last_access)
    }

    /// Cache keys of every indexed entry
    pub fn keys(&self) -> Vec<String> {
        self.index.keys()
    }

    /// Aggregate size of all indexed entries in bytes
    pub fn size(&self) -> u64 {
        self.index.total_size()
    }

    pub fn file_count(&self) -> usize {
        self.index.len()
    }

    /// Delete every file in the cache directory and empty the index.
    ///
    /// Entries whose file could not be deleted stay indexed.
    pub async fn clear(&self) {
        let files = match self.store.list_all().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Failed to list cache directory for clear");
                Vec::new()
            }
        };

        let mut deleted = 0;
        for file in &files {
            let _guard = self.locks.lock(&file.key).await;
            if self.store.delete(&file.key).await {
                deleted += 1;
            }
            if self.store.read(&file.key).await.is_none() {
                self.index.remove(&file.key);
            }
        }

        for key in self.index.keys() {
            let _guard = self.locks.lock(&key).await;
            if self.store.read(&key).await.is_none() {
                self.index.remove(&key);
            }
        }

        let foreign = match self.store.remove_foreign_files().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Failed to remove non-entry files during clear");
                0
            }
        };

        info!(
            files = deleted,
            foreign,
            remaining = self.index.len(),
            "Cache cleared"
        );
    }

    /// Run an expiration pass followed by an LRU pass.
    ///
    /// Only one pass runs at a time per cache; a concurrent call returns a
    /// result with `skipped` set and no removals.
    pub async fn perform_maintenance(&self) -> Result<MaintenanceResult> {
        let Ok(_maintenance) = self.maintenance_lock.try_lock() else {
            info!("Maintenance already running, skipping");
            return Ok(MaintenanceResult {
                final_size: self.index.total_size(),
                final_count: self.index.len(),
                skipped: true,
                ..Default::default()
            });
        };

        let started = Instant::now();
        let policy = EvictionPolicy::new(&self.store, &self.index, &self.locks);

        let expired = policy
            .expire_by_age(self.config.ttl())
            .await
            .map_err(|e| {
                error!(error = %e, "Cache maintenance failed");
                CacheError::Maintenance(e.to_string())
            })?;

        let lru = {
            let _evicting = self.eviction_lock.lock().await;
            policy
                .evict_lru(self.config.max_cache_size, self.config.eviction_target())
                .await
        };

        let result = MaintenanceResult {
            expired_removed: expired.removed,
            lru_removed: lru.removed,
            total_removed: expired.removed + lru.removed,
            bytes_freed: expired.bytes_freed + lru.bytes_freed,
            duration_ms: started.elapsed().as_millis() as u64,
            final_size: self.index.total_size(),
            final_count: self.index.len(),
            stale_reconciled: expired.stale_reconciled + lru.stale_reconciled,
            skipped: false,
        };

        info!(
            expired = result.expired_removed,
            lru = result.lru_removed,
            bytes_freed = result.bytes_freed,
            final_size = result.final_size,
            final_count = result.final_count,
            duration_ms = result.duration_ms,
            "Cache maintenance completed"
        );
        Ok(result)
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_size: self.index.total_size(),
            file_count: self.index.len(),
            max_size: self.config.max_cache_size,
            ttl_days: self.config.ttl_days(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

//! Expiration and LRU eviction passes

use crate::index::MetadataIndex;
use crate::locks::KeyLocks;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// What a single eviction pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub removed: usize,
    pub bytes_freed: u64,
    /// Index entries dropped because their file no longer exists
    pub stale_reconciled: usize,
    /// Files found on disk without an index entry and added to the index
    pub adopted: usize,
    /// Index entries whose size disagreed with the file on disk
    pub resized: usize,
}

/// Oldest modification time still within `max_age`, or `None` when no
/// timestamp can be that old.
pub(crate) fn expiry_cutoff(max_age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
}

/// The two eviction passes, operating through a store and its index.
///
/// Every file deletion and its index update happen under the key's lock, so a
/// pass never interleaves with a put or remove of the same key.
pub struct EvictionPolicy<'a> {
    store: &'a CacheStore,
    index: &'a MetadataIndex,
    locks: &'a KeyLocks,
}

impl<'a> EvictionPolicy<'a> {
    pub fn new(store: &'a CacheStore, index: &'a MetadataIndex, locks: &'a KeyLocks) -> Self {
        Self {
            store,
            index,
            locks,
        }
    }

    /// Delete every entry whose file was last modified more than `max_age` ago.
    ///
    /// Driven by a full directory listing, so this also reconciles the index
    /// with the disk: entries whose file disappeared are dropped and unknown
    /// cache files are adopted. Fails only if the directory cannot be listed.
    pub async fn expire_by_age(&self, max_age: Duration) -> crate::Result<PassOutcome> {
        let cutoff = expiry_cutoff(max_age);
        let is_expired = |modified: DateTime<Utc>| cutoff.is_some_and(|c| modified < c);

        let mut outcome = PassOutcome::default();
        let mut seen = HashSet::new();

        for listed in self.store.list_all().await? {
            let _guard = self.locks.lock(&listed.key).await;
            seen.insert(listed.key.clone());

            // The listing may be out of date by the time the lock is held
            let Some(file) = self.store.read(&listed.key).await else {
                if self.index.remove(&listed.key).is_some() {
                    outcome.stale_reconciled += 1;
                }
                continue;
            };

            if !is_expired(file.modified) {
                if !self.index.contains(&file.key) {
                    self.index.record_put(&file.key, file.size, file.modified);
                    outcome.adopted += 1;
                } else if self.index.reconcile_size(&file.key, file.size) {
                    outcome.resized += 1;
                }
                continue;
            }

            if self.store.delete(&file.key).await {
                self.index.remove(&file.key);
                outcome.removed += 1;
                outcome.bytes_freed += file.size;
                debug!(key = %file.key, size = file.size, "Expired cache entry");
            }
        }

        for key in self.index.keys() {
            if seen.contains(&key) {
                continue;
            }
            let _guard = self.locks.lock(&key).await;
            if self.store.read(&key).await.is_some() {
                continue;
            }
            if self.index.remove(&key).is_some() {
                outcome.stale_reconciled += 1;
                debug!(key = %key, "Dropped stale index entry");
            }
        }

        if outcome.removed > 0 {
            info!(
                files = outcome.removed,
                bytes = outcome.bytes_freed,
                "Evicted expired cache entries"
            );
        }
        Ok(outcome)
    }

    /// Evict least recently accessed entries once the aggregate size exceeds
    /// `max_size`, stopping as soon as it is at or below `target`.
    ///
    /// Entries put or accessed again after the pass started are skipped.
    pub async fn evict_lru(&self, max_size: u64, target: u64) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        if self.index.total_size() <= max_size {
            return outcome;
        }

        for (key, entry) in self.index.snapshot_ordered_by_access() {
            if self.index.total_size() <= target {
                break;
            }

            let _guard = self.locks.lock(&key).await;
            if self.index.get(&key) != Some(entry) {
                continue;
            }

            if self.store.delete(&key).await {
                let size = self.index.remove(&key).unwrap_or(entry.size);
                outcome.removed += 1;
                outcome.bytes_freed += size;
                debug!(key = %key, size, "Evicted least recently used cache entry");
            } else if self.store.read(&key).await.is_none() && self.index.remove(&key).is_some() {
                outcome.stale_reconciled += 1;
            }
        }

        if outcome.removed > 0 {
            info!(
                files = outcome.removed,
                bytes = outcome.bytes_freed,
                total_size = self.index.total_size(),
                "LRU eviction freed cache space"
            );
        }
        outcome
    }
}

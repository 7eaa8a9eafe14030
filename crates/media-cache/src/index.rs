//! In-memory size and access-time index

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Indexed metadata for one cached file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub size: u64,
    pub last_access: DateTime<Utc>,
    /// Monotonic sequence number of the last put/access, breaks access-time ties
    seq: u64,
}

/// Concurrent map of cache key to size and last access, plus an aggregate size counter.
///
/// Every mutation of the counter is a delta derived from the value that the map
/// atomically swapped in or out, so the counter equals the sum of indexed sizes
/// whenever no operation is in flight.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    entries: DashMap<String, IndexEntry>,
    total_size: AtomicI64,
    seq: AtomicU64,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert or replace an entry, adjusting the aggregate by the size difference
    pub fn record_put(&self, key: &str, size: u64, access_time: DateTime<Utc>) {
        let entry = IndexEntry {
            size,
            last_access: access_time,
            seq: self.next_seq(),
        };
        let old_size = self
            .entries
            .insert(key.to_string(), entry)
            .map(|old| old.size)
            .unwrap_or(0);
        self.total_size
            .fetch_add(size as i64 - old_size as i64, Ordering::AcqRel);
    }

    /// Refresh the last access time. Returns `false`, changing nothing, for
    /// unknown keys.
    pub fn record_access(&self, key: &str, time: DateTime<Utc>) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.last_access = time;
                entry.seq = self.next_seq();
                true
            }
            None => false,
        }
    }

    /// Correct the recorded size of an existing entry without touching its
    /// access time. Returns whether the size changed.
    pub fn reconcile_size(&self, key: &str, size: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.size != size => {
                let old_size = std::mem::replace(&mut entry.size, size);
                self.total_size
                    .fetch_add(size as i64 - old_size as i64, Ordering::AcqRel);
                true
            }
            _ => false,
        }
    }

    /// Drop an entry, returning the size it accounted for
    pub fn remove(&self, key: &str) -> Option<u64> {
        let (_, entry) = self.entries.remove(key)?;
        self.total_size
            .fetch_sub(entry.size as i64, Ordering::AcqRel);
        Some(entry.size)
    }

    pub fn get(&self, key: &str) -> Option<IndexEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Aggregate size of all indexed entries
    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Acquire).max(0) as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove every entry; returns how many were dropped
    pub fn clear(&self) -> usize {
        self.keys()
            .iter()
            .filter(|key| self.remove(key).is_some())
            .count()
    }

    /// Point-in-time view of all entries, least recently accessed first.
    ///
    /// The returned sequence is not updated by later mutations.
    pub fn snapshot_ordered_by_access(&self) -> impl Iterator<Item = (String, IndexEntry)> {
        let mut snapshot: Vec<(String, IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        snapshot.sort_by_key(|(_, entry)| (entry.last_access, entry.seq));
        snapshot.into_iter()
    }
}

//! Cache types

use serde::{Deserialize, Serialize};

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_size: u64,
    pub file_count: usize,
    pub max_size: u64,
    pub ttl_days: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Outcome of one maintenance pass (expire, then LRU)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceResult {
    pub expired_removed: usize,
    pub lru_removed: usize,
    pub total_removed: usize,
    pub bytes_freed: u64,
    pub duration_ms: u64,
    pub final_size: u64,
    pub final_count: usize,
    /// Index entries dropped because their file had disappeared
    pub stale_reconciled: usize,
    /// Set when another pass was already running and this call did nothing
    pub skipped: bool,
}

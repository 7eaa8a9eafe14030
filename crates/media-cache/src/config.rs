//! Cache configuration

use crate::error::{CacheError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration for a [`MediaCache`](crate::MediaCache) instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory dedicated to cached blobs
    pub cache_dir: PathBuf,
    /// Hard cap on the aggregate size in bytes
    pub max_cache_size: u64,
    /// Maximum age of an entry, measured from its last write
    pub cache_ttl_secs: u64,
    /// Fraction of `max_cache_size` that LRU eviction drives the cache down to
    pub eviction_target_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/media"),
            max_cache_size: 500 * 1024 * 1024, // 500MB
            cache_ttl_secs: 7 * SECS_PER_DAY,  // 7 days
            eviction_target_ratio: 0.8,
        }
    }
}

impl CacheConfig {
    /// Build a configuration for `cache_dir` with default limits
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_cache_size(mut self, max_cache_size: u64) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    pub fn with_ttl_secs(mut self, cache_ttl_secs: u64) -> Self {
        self.cache_ttl_secs = cache_ttl_secs;
        self
    }

    pub fn with_eviction_target_ratio(mut self, ratio: f64) -> Self {
        self.eviction_target_ratio = ratio;
        self
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let max_cache_size = env::var("MAX_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.max_cache_size);

        let cache_ttl_secs = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.cache_ttl_secs);

        let eviction_target_ratio = env::var("EVICTION_TARGET_RATIO")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.eviction_target_ratio);

        Self {
            cache_dir,
            max_cache_size,
            cache_ttl_secs,
            eviction_target_ratio,
        }
    }

    /// Reject settings that would make eviction meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.eviction_target_ratio > 0.0 && self.eviction_target_ratio <= 1.0) {
            return Err(CacheError::Config(format!(
                "eviction target ratio must be in (0, 1], got {}",
                self.eviction_target_ratio
            )));
        }
        Ok(())
    }

    /// Size in bytes that LRU eviction stops at
    pub fn eviction_target(&self) -> u64 {
        (self.max_cache_size as f64 * self.eviction_target_ratio).floor() as u64
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn ttl_days(&self) -> u64 {
        self.cache_ttl_secs / SECS_PER_DAY
    }
}

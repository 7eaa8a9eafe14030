use crate::scheduler::SchedulerConfig;
use media_cache::CacheConfig;
use std::env;
use std::time::Duration;

/// Janitor configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub port: u16,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
}

impl JanitorConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3005);

        let defaults = SchedulerConfig::default();

        let interval = env::var("CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);

        let max_attempts = env::var("CLEANUP_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_attempts);

        let initial_backoff = env::var("CLEANUP_INITIAL_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        Self {
            port,
            cache: CacheConfig::from_env(),
            scheduler: SchedulerConfig {
                interval,
                max_attempts,
                initial_backoff,
            },
        }
    }
}

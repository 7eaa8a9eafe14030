//! Periodic cache maintenance with retry
//!
//! The cache itself never schedules anything. This scheduler owns the cadence,
//! retries a failed pass with exponential backoff, and keeps at most one
//! periodic job per name alive.

use crate::types::{CleanupState, CleanupStatus};
use chrono::Utc;
use media_cache::MediaCache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

pub const CLEANUP_JOB_NAME: &str = "media_cache_cleanup";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between periodic runs
    pub interval: Duration,
    /// Attempts per run before it is reported as failed
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60), // daily
            max_attempts: 3,
            initial_backoff: Duration::from_secs(10),
        }
    }
}

/// Delay after the given failed attempt: `initial`, doubling per attempt
/// without overflowing
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[derive(Clone)]
pub struct CleanupScheduler {
    cache: Arc<MediaCache>,
    config: SchedulerConfig,
    jobs: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    status: Arc<RwLock<Option<CleanupStatus>>>,
}

impl CleanupScheduler {
    pub fn new(cache: Arc<MediaCache>, config: SchedulerConfig) -> Self {
        Self {
            cache,
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            status: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the periodic cleanup job unless one is already scheduled.
    ///
    /// Returns `false` if an existing job was kept.
    pub fn schedule_periodic(&self) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get(CLEANUP_JOB_NAME) {
            if !job.is_finished() {
                info!(job = CLEANUP_JOB_NAME, "Periodic cleanup already scheduled, keeping it");
                return false;
            }
        }

        let scheduler = self.clone();
        let period = self.config.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.run_now().await;
            }
        });
        jobs.insert(CLEANUP_JOB_NAME.to_string(), handle);

        info!(
            job = CLEANUP_JOB_NAME,
            interval_secs = period.as_secs(),
            "Scheduled periodic media cache cleanup"
        );
        true
    }

    /// Stop the periodic cleanup job; returns whether one was scheduled
    pub fn cancel_periodic(&self) -> bool {
        let job = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(CLEANUP_JOB_NAME);
        match job {
            Some(handle) => {
                handle.abort();
                info!(job = CLEANUP_JOB_NAME, "Cancelled periodic media cache cleanup");
                true
            }
            None => false,
        }
    }

    /// Run maintenance now, retrying failures with exponential backoff
    pub async fn run_now(&self) -> CleanupStatus {
        let started_at = Utc::now();
        info!("Starting media cache cleanup");

        let mut attempts = 0;
        let status = loop {
            attempts += 1;
            *self.status.write().await = Some(CleanupStatus::running(started_at, attempts));

            match self.cache.perform_maintenance().await {
                Ok(result) => {
                    info!(
                        attempts,
                        files_removed = result.total_removed,
                        bytes_freed = result.bytes_freed,
                        final_cache_size = result.final_size,
                        final_file_count = result.final_count,
                        "Media cache cleanup completed"
                    );
                    break CleanupStatus::succeeded(started_at, attempts, &result);
                }
                Err(e) if attempts < self.config.max_attempts => {
                    let delay = backoff_delay(self.config.initial_backoff, attempts);
                    warn!(
                        error = %e,
                        "Cache cleanup failed, retrying in {:?} (attempt {}/{})",
                        delay, attempts, self.config.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, attempts, "Cache cleanup failed permanently");
                    break CleanupStatus::failed(started_at, attempts, e.to_string());
                }
            }
        };

        *self.status.write().await = Some(status.clone());
        status
    }

    /// Status of the latest run, if any has started
    pub async fn last_status(&self) -> Option<CleanupStatus> {
        self.status.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        matches!(
            self.status.read().await.as_ref().map(|s| s.state),
            Some(CleanupState::Running)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_cache::CacheConfig;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    async fn test_cache() -> (TempDir, PathBuf, Arc<MediaCache>) {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("media");
        let cache = MediaCache::new(CacheConfig::new(&cache_dir).with_max_cache_size(100));
        cache.initialize().await.unwrap();
        (dir, cache_dir, Arc::new(cache))
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(20),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    /// Replace the cache directory with a plain file so listing it fails
    fn break_cache_dir(cache_dir: &Path) {
        std::fs::remove_dir_all(cache_dir).unwrap();
        std::fs::write(cache_dir, b"not a directory").unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let initial = Duration::from_secs(10);
        assert_eq!(backoff_delay(initial, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(initial, 2), Duration::from_secs(20));
        assert_eq!(backoff_delay(initial, 3), Duration::from_secs(40));
        let capped = initial * u32::MAX;
        assert_eq!(backoff_delay(initial, 40), capped);
        assert_eq!(backoff_delay(initial, u32::MAX), capped);
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_run_now_success() {
        let (_dir, _cache_dir, cache) = test_cache().await;
        for i in 0..3 {
            cache.put_bytes(&format!("k{}", i), &[0u8; 50]).await.unwrap();
        }
        let scheduler = CleanupScheduler::new(cache.clone(), fast_config());

        let status = scheduler.run_now().await;

        assert_eq!(status.state, CleanupState::Succeeded);
        assert_eq!(status.attempts, 1);
        assert_eq!(status.final_cache_size, cache.size());
        assert!(status.final_cache_size <= 100);
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.last_status().await.unwrap().state, CleanupState::Succeeded);
    }

    #[tokio::test]
    async fn test_run_now_gives_up_after_max_attempts() {
        let (_dir, cache_dir, cache) = test_cache().await;
        break_cache_dir(&cache_dir);
        let scheduler = CleanupScheduler::new(cache, fast_config());

        let status = scheduler.run_now().await;

        assert_eq!(status.state, CleanupState::Failed);
        assert_eq!(status.attempts, 3);
        assert!(status.error.unwrap().contains("Maintenance failed"));
    }

    #[tokio::test]
    async fn test_run_now_recovers_on_retry() {
        let (_dir, cache_dir, cache) = test_cache().await;
        break_cache_dir(&cache_dir);
        let scheduler = CleanupScheduler::new(
            cache,
            SchedulerConfig {
                initial_backoff: Duration::from_millis(300),
                ..fast_config()
            },
        );

        let run = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_now().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.is_running().await);
        std::fs::remove_file(&cache_dir).unwrap();
        std::fs::create_dir(&cache_dir).unwrap();

        let status = run.await.unwrap();
        assert_eq!(status.state, CleanupState::Succeeded);
        assert_eq!(status.attempts, 2);
    }

    #[tokio::test]
    async fn test_schedule_periodic_keeps_existing_job() {
        let (_dir, _cache_dir, cache) = test_cache().await;
        let scheduler = CleanupScheduler::new(cache, fast_config());

        assert!(scheduler.schedule_periodic());
        assert!(!scheduler.schedule_periodic());

        assert!(scheduler.cancel_periodic());
        assert!(!scheduler.cancel_periodic());

        assert!(scheduler.schedule_periodic());
        scheduler.cancel_periodic();
    }

    #[tokio::test]
    async fn test_periodic_job_runs_cleanup() {
        let (_dir, _cache_dir, cache) = test_cache().await;
        let scheduler = CleanupScheduler::new(cache, fast_config());
        assert!(scheduler.last_status().await.is_none());

        scheduler.schedule_periodic();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.cancel_periodic();

        let status = scheduler.last_status().await.unwrap();
        assert_ne!(status.state, CleanupState::Failed);
    }
}

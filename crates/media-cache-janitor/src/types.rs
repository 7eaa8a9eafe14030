//! Core types for the media cache janitor

use chrono::{DateTime, Utc};
use media_cache::{CacheStats, MaintenanceResult};
use serde::{Deserialize, Serialize};

/// State of the most recent cleanup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupState {
    Running,
    Succeeded,
    Failed,
}

/// Outcome of a cleanup run, including retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStatus {
    pub state: CleanupState,
    pub attempts: u32,
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub final_cache_size: u64,
    pub final_file_count: usize,
    /// Set when the run coalesced with a maintenance pass already in progress
    pub skipped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupStatus {
    pub fn running(started_at: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            state: CleanupState::Running,
            attempts,
            files_removed: 0,
            bytes_freed: 0,
            final_cache_size: 0,
            final_file_count: 0,
            skipped: false,
            started_at,
            finished_at: None,
            error: None,
        }
    }

    pub fn succeeded(started_at: DateTime<Utc>, attempts: u32, result: &MaintenanceResult) -> Self {
        Self {
            state: CleanupState::Succeeded,
            files_removed: result.total_removed,
            bytes_freed: result.bytes_freed,
            final_cache_size: result.final_size,
            final_file_count: result.final_count,
            skipped: result.skipped,
            finished_at: Some(Utc::now()),
            ..Self::running(started_at, attempts)
        }
    }

    pub fn failed(started_at: DateTime<Utc>, attempts: u32, error: String) -> Self {
        Self {
            state: CleanupState::Failed,
            finished_at: Some(Utc::now()),
            error: Some(error),
            ..Self::running(started_at, attempts)
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

//! File-level storage for cached blobs
//!
//! This is the only part of the cache that touches the filesystem. Entries are
//! flat files in a single directory, named by their cache key. Writes land in a
//! temporary sibling first and are renamed into place, so a reader never sees a
//! partially written entry.

use crate::error::Result;
use crate::key::is_cache_key;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

const TMP_PREFIX: &str = ".tmp-";

/// A cache file as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    tmp_seq: AtomicU64,
}

/// Map `NotFound` to `None`, keeping every other error.
fn catch_not_found<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(x) => Ok(Some(x)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!("{}{}-{}-{}", TMP_PREFIX, key, std::process::id(), seq))
    }

    /// Create the cache directory if it does not exist yet
    pub async fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    /// Copy `source` into the entry for `key`, replacing any previous content.
    ///
    /// Returns the size of the stored entry.
    pub async fn write(&self, key: &str, source: &Path) -> Result<u64> {
        self.ensure_directory().await?;
        let tmp = self.tmp_path_for(key);

        let size = match fs::copy(source, &tmp).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e.into());
            }
        };
        self.commit(&tmp, key).await?;

        debug!(key = %key, size, "Stored cache file");
        Ok(size)
    }

    /// Store `data` as the entry for `key`, replacing any previous content
    pub async fn write_bytes(&self, key: &str, data: &[u8]) -> Result<u64> {
        self.ensure_directory().await?;
        let tmp = self.tmp_path_for(key);

        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        self.commit(&tmp, key).await?;

        Ok(data.len() as u64)
    }

    async fn commit(&self, tmp: &Path, key: &str) -> Result<()> {
        if let Err(e) = fs::rename(tmp, self.path_for(key)).await {
            let _ = fs::remove_file(tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Look up the file for `key`; missing or unreadable files are reported as absent
    pub async fn read(&self, key: &str) -> Option<StoredFile> {
        let path = self.path_for(key);
        let metadata = catch_not_found(fs::metadata(&path).await);
        match metadata {
            Ok(Some(metadata)) if metadata.is_file() => Some(StoredFile {
                key: key.to_string(),
                size: metadata.len(),
                modified: modified_time(&metadata),
                path,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to stat cache file, treating as absent");
                None
            }
        }
    }

    /// Remove the file for `key`, returning whether a file was actually deleted
    pub async fn delete(&self, key: &str) -> bool {
        match catch_not_found(fs::remove_file(self.path_for(key)).await) {
            Ok(removed) => removed.is_some(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete cache file");
                false
            }
        }
    }

    /// Enumerate every cache entry on disk.
    ///
    /// Files whose names are not cache keys are skipped. A missing directory
    /// yields an empty listing; any other failure to read it is an error.
    pub async fn list_all(&self) -> Result<Vec<StoredFile>> {
        let mut dir = match catch_not_found(fs::read_dir(&self.cache_dir).await)? {
            Some(dir) => dir,
            None => {
                warn!(cache_dir = ?self.cache_dir, "Cache directory not found");
                return Ok(Vec::new());
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let key = match entry.file_name().to_str() {
                Some(name) if is_cache_key(name) => name.to_string(),
                _ => continue,
            };
            // The file may vanish between listing and stat
            let metadata = match catch_not_found(entry.metadata().await)? {
                Some(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            files.push(StoredFile {
                key,
                path: entry.path(),
                size: metadata.len(),
                modified: modified_time(&metadata),
            });
        }

        Ok(files)
    }

    /// Delete leftovers of writes that never completed
    pub async fn remove_temp_files(&self) -> Result<usize> {
        self.remove_files_where(|name| name.starts_with(TMP_PREFIX)).await
    }

    /// Delete every file in the cache directory that is not a cache entry,
    /// including incomplete writes
    pub async fn remove_foreign_files(&self) -> Result<usize> {
        self.remove_files_where(|name| !is_cache_key(name)).await
    }

    async fn remove_files_where(&self, matches: impl Fn(&str) -> bool) -> Result<usize> {
        let mut dir = match catch_not_found(fs::read_dir(&self.cache_dir).await)? {
            Some(dir) => dir,
            None => return Ok(0),
        };

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            if !matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let is_file = catch_not_found(entry.file_type().await)?.is_some_and(|t| t.is_file());
            if is_file && catch_not_found(fs::remove_file(entry.path()).await)?.is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

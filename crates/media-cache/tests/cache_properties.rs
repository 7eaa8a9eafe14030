use media_cache::{derive_cache_key, CacheConfig, MediaCache};
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const UNIT: usize = 100;

async fn new_cache(dir: &TempDir, max_size: u64) -> MediaCache {
    let config = CacheConfig::new(dir.path().join("media"))
        .with_max_cache_size(max_size)
        .with_eviction_target_ratio(0.8);
    let cache = MediaCache::new(config);
    cache.initialize().await.unwrap();
    cache
}

fn disk_total(cache_dir: &Path) -> u64 {
    std::fs::read_dir(cache_dir)
        .unwrap()
        .map(|entry| entry.unwrap().metadata().unwrap().len())
        .sum()
}

fn indexed_total(cache: &MediaCache, logical_keys: &[&str]) -> u64 {
    logical_keys
        .iter()
        .filter_map(|key| cache.file_size(key))
        .sum()
}

#[tokio::test]
async fn test_round_trip_is_byte_identical() {
    let dir = tempdir().unwrap();
    let cache = new_cache(&dir, 1024 * 1024).await;

    let contents: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let source = dir.path().join("photo.png");
    std::fs::write(&source, &contents).unwrap();

    cache.put("https://cdn.example.com/photo.png", &source).await.unwrap();
    let cached = cache.get("https://cdn.example.com/photo.png").await.unwrap();

    assert_eq!(std::fs::read(&cached).unwrap(), contents);
    assert_eq!(
        cached.file_name().unwrap().to_str().unwrap(),
        derive_cache_key("https://cdn.example.com/photo.png")
    );
}

#[tokio::test]
async fn test_lru_evicts_oldest_down_to_target() {
    // Scaled-down version of a 500 MB cap with a 400 MB target
    let dir = tempdir().unwrap();
    let cache = new_cache(&dir, 5 * UNIT as u64).await;

    for key in ["A", "B", "C", "D", "E"] {
        cache.put_bytes(key, &[0u8; UNIT]).await.unwrap();
    }
    // Exactly at the cap: nothing evicted
    assert_eq!(cache.size(), 500);
    assert_eq!(cache.file_count(), 5);

    cache.put_bytes("F", &[0u8; UNIT / 2]).await.unwrap();

    assert!(!cache.contains("A"));
    assert!(!cache.contains("B"));
    for key in ["C", "D", "E", "F"] {
        assert!(cache.contains(key), "{} should still be cached", key);
    }
    assert_eq!(cache.size(), 350);
    assert_eq!(disk_total(&dir.path().join("media")), 350);
}

#[tokio::test]
async fn test_lru_respects_recent_access() {
    let dir = tempdir().unwrap();
    let cache = new_cache(&dir, 5 * UNIT as u64).await;

    for key in ["A", "B", "C", "D", "E"] {
        cache.put_bytes(key, &[0u8; UNIT]).await.unwrap();
    }
    // Reading A makes B and C the least recently used
    assert!(cache.get("A").await.is_some());

    cache.put_bytes("F", &[0u8; UNIT / 2]).await.unwrap();

    assert!(cache.contains("A"));
    assert!(!cache.contains("B"));
    assert!(!cache.contains("C"));
    assert_eq!(cache.size(), 350);
}

#[tokio::test]
async fn test_sizes_agree_after_mixed_operations() {
    let dir = tempdir().unwrap();
    let cache = new_cache(&dir, 10 * UNIT as u64).await;
    let keys = ["a", "b", "c", "d", "e", "f", "g", "h"];

    for (i, key) in keys.iter().enumerate() {
        cache.put_bytes(key, &vec![1u8; UNIT + i * 30]).await.unwrap();
    }
    cache.remove("c").await;
    cache.put_bytes("a", &[2u8; 10]).await.unwrap();
    cache.put_bytes("h", &[3u8; 3 * UNIT]).await.unwrap();
    cache.perform_maintenance().await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.total_size, cache.size());
    assert_eq!(stats.total_size, indexed_total(&cache, &keys));
    assert_eq!(stats.total_size, disk_total(&dir.path().join("media")));
    assert!(stats.total_size <= 10 * UNIT as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_keep_counter_consistent() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(new_cache(&dir, 20 * UNIT as u64).await);

    let mut tasks = Vec::new();
    for worker in 0..8usize {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..40usize {
                let key = format!("https://cdn.example.com/{}", (worker * 7 + i) % 25);
                match i % 4 {
                    0 | 1 => {
                        let _ = cache.put_bytes(&key, &vec![0u8; 10 + i * 5]).await;
                    }
                    2 => {
                        cache.get(&key).await;
                    }
                    _ => cache.remove(&key).await,
                }
            }
        }));
    }
    let maintenance = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.perform_maintenance().await })
    };

    for task in tasks {
        task.await.unwrap();
    }
    maintenance.await.unwrap().unwrap();

    let keys: Vec<String> = (0..25)
        .map(|i| format!("https://cdn.example.com/{}", i))
        .collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    assert_eq!(cache.size(), indexed_total(&cache, &key_refs));
    assert_eq!(cache.size(), disk_total(&dir.path().join("media")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_puts_index_the_surviving_write() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(new_cache(&dir, 1024 * 1024).await);
    let path = dir.path().join("media").join(derive_cache_key("contested"));

    for _ in 0..200 {
        let small = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put_bytes("contested", &[1u8; 10]).await })
        };
        let large = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put_bytes("contested", &[2u8; 2000]).await })
        };
        small.await.unwrap().unwrap();
        large.await.unwrap().unwrap();

        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(cache.file_size("contested"), Some(on_disk));
        assert_eq!(cache.size(), on_disk);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_put_and_remove_agree_with_disk() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(new_cache(&dir, 1024 * 1024).await);
    let path = dir.path().join("media").join(derive_cache_key("contested"));

    for _ in 0..200 {
        let put = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put_bytes("contested", &[0u8; 500]).await })
        };
        let remove = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.remove("contested").await })
        };
        put.await.unwrap().unwrap();
        remove.await.unwrap();

        assert_eq!(cache.contains("contested"), path.exists());
        let on_disk = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        assert_eq!(cache.size(), on_disk);
    }
}

#[tokio::test]
async fn test_restart_preserves_entries() {
    let dir = tempdir().unwrap();
    {
        let cache = new_cache(&dir, 1024 * 1024).await;
        cache.put_bytes("persisted", b"still here").await.unwrap();
        cache.shutdown().await;
    }

    let cache = new_cache(&dir, 1024 * 1024).await;
    assert!(cache.contains("persisted"));
    let path = cache.get("persisted").await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"still here");
}

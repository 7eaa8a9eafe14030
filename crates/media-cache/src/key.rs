//! Logical key to cache file name mapping

use sha2::{Digest, Sha256};

/// Length of a derived cache key (hex-encoded SHA-256)
pub const CACHE_KEY_LEN: usize = 64;

/// Derive the cache key for a logical key such as a source URL.
///
/// The result is a lowercase hex digest and is safe to use as a file name.
/// Distinct logical keys are not guaranteed distinct cache keys.
pub fn derive_cache_key(logical_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logical_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `name` has the shape of a derived cache key
pub fn is_cache_key(name: &str) -> bool {
    name.len() == CACHE_KEY_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

//! Response caching keyed by final request URL.
//!
//! [`CacheStore`] is the capability a [`Request`](crate::Request) consults
//! before touching the network. Two implementations are provided:
//!
//! - [`NullCache`]: No-op store (always misses, never writes)
//! - [`FixedExpirationCache`]: File-based store where entries expire a fixed
//!   time after they were written
//!
//! Entries live in one file per URL named `<sha256(url)>.webcache`, by default
//! in the system temp directory.
//!
//! # Example
//!
//! ```
//! use webreq::cache::{CacheStore, NullCache};
//! use webreq::Response;
//!
//! let cache = NullCache;
//! let response = Response::new(200, [("content-type", "text/plain")], b"hi".to_vec());
//! cache.save_to_cache("https://example.com/", &response).unwrap();
//! assert!(!cache.is_in_cache("https://example.com/").unwrap()); // NullCache always misses
//! ```

mod entry;
mod file;

pub use file::FixedExpirationCache;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::response::Response;

/// File extension of cache entries.
pub const CACHE_FILE_EXTENSION: &str = "webcache";

/// Store mapping a final request URL to a previously received [`Response`].
pub trait CacheStore: Send + Sync {
    /// Whether a usable entry exists for `url`.
    fn is_in_cache(&self, url: &str) -> Result<bool>;

    /// Retrieve the stored response for `url`.
    ///
    /// Returns `Ok(None)` when [`is_in_cache`](Self::is_in_cache) is false.
    fn get_from_cache(&self, url: &str) -> Result<Option<Response>>;

    /// Store `response` for `url`, replacing any previous entry.
    fn save_to_cache(&self, url: &str, response: &Response) -> Result<()>;
}

/// No-op [`CacheStore`] that never stores or retrieves responses.
///
/// This is the default store of every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CacheStore for NullCache {
    fn is_in_cache(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_from_cache(&self, _url: &str) -> Result<Option<Response>> {
        Ok(None)
    }

    fn save_to_cache(&self, _url: &str, _response: &Response) -> Result<()> {
        Ok(())
    }
}

/// Cache key for `url`: lower-case hex SHA-256 digest.
#[must_use]
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Path of the entry for `url` inside `dir`.
pub fn cache_file_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(format!("{}.{CACHE_FILE_EXTENSION}", cache_key(url)))
}

/// The system temp directory, failing with [`Error::Config`] if it is unusable.
pub fn default_cache_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir();
    if dir.as_os_str().is_empty() || !dir.is_dir() {
        return Err(Error::Config(format!(
            "no usable temp directory for the response cache (resolved {})",
            dir.display()
        )));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_cache_always_misses() {
        let cache = NullCache;
        let url = "https://api.example.com/ip";
        let response = Response::new(200, [("content-type", "text/plain")], b"hello".to_vec());

        assert!(!cache.is_in_cache(url).unwrap());

        // Saving and reading back still misses
        cache.save_to_cache(url, &response).unwrap();
        assert!(!cache.is_in_cache(url).unwrap());
        assert!(cache.get_from_cache(url).unwrap().is_none());
    }

    #[test]
    fn test_null_cache_never_writes_files() {
        let url = "https://api.example.com/null-cache-probe";
        let path = cache_file_path(&default_cache_dir().unwrap(), url);
        let response = Response::new(200, Vec::<(String, String)>::new(), b"x".to_vec());

        NullCache.save_to_cache(url, &response).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_cache_key_is_sha256_hex() {
        assert_eq!(
            cache_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(cache_key("https://a/"), cache_key("https://a/"));
        assert_ne!(cache_key("https://a/"), cache_key("https://b/"));
    }

    #[test]
    fn test_cache_file_path_layout() {
        let path = cache_file_path(Path::new("/tmp"), "");
        assert_eq!(
            path,
            PathBuf::from(
                "/tmp/e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.webcache"
            )
        );
    }

    #[test]
    fn test_default_cache_dir_is_temp_dir() {
        assert_eq!(default_cache_dir().unwrap(), std::env::temp_dir());
    }
}

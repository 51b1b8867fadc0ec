//! File-based cache with fixed expiration.
//!
//! [`FixedExpirationCache`] stores one entry file per URL. An entry is fresh
//! while its age, taken from the file modification time, is below the
//! configured maximum age. A maximum age of zero keeps entries forever.
//!
//! Writes go to a temporary file in the cache directory that is then renamed
//! over the entry path, so concurrent writers never leave a torn entry behind
//! (the last rename wins).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use super::{CacheStore, cache_file_path, default_cache_dir, entry};
use crate::error::Result;
use crate::response::Response;

/// File-based [`CacheStore`] whose entries expire `max_age` after being written.
///
/// Directory layout:
/// ```text
/// {dir}/
/// +-- 8f43...e1.webcache   # sha256 of the final URL
/// +-- ...
/// ```
#[derive(Debug, Clone)]
pub struct FixedExpirationCache {
    dir: PathBuf,
    max_age: Duration,
}

impl FixedExpirationCache {
    /// Create a cache in the system temp directory.
    ///
    /// Fails with [`Error::Config`](crate::Error::Config) if no temp directory
    /// is available.
    pub fn new(max_age: Duration) -> Result<Self> {
        Ok(Self::with_dir(default_cache_dir()?, max_age))
    }

    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn with_dir(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    /// Directory holding the entry files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maximum entry age. Zero means entries never expire.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Path of the entry file for `url`.
    pub fn path_for(&self, url: &str) -> PathBuf {
        cache_file_path(&self.dir, url)
    }
}

impl CacheStore for FixedExpirationCache {
    fn is_in_cache(&self, url: &str) -> Result<bool> {
        let modified = match fs::metadata(self.path_for(url)) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        // A modification time in the future counts as brand new
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(is_fresh(age, self.max_age))
    }

    fn get_from_cache(&self, url: &str) -> Result<Option<Response>> {
        if !self.is_in_cache(url)? {
            return Ok(None);
        }
        let bytes = fs::read(self.path_for(url))?;
        entry::decode(&bytes).map(Some)
    }

    fn save_to_cache(&self, url: &str, response: &Response) -> Result<()> {
        let bytes = entry::encode(response)?;
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        let path = self.path_for(url);
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!("cached response for {url} at {}", path.display());
        Ok(())
    }
}

/// Whether an entry of `age` is still within `max_age` (zero never expires).
fn is_fresh(age: Duration, max_age: Duration) -> bool {
    max_age.is_zero() || age < max_age
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const URL: &str = "https://api.example.com/ip?format=json";

    fn sample_response() -> Response {
        Response::new(
            200,
            [("Content-Type", "application/json"), ("X-Request-Id", "42")],
            br#"{"ip":"1.2.3.4"}"#.to_vec(),
        )
    }

    /// Backdate the entry for `url` by `age`.
    fn set_age(cache: &FixedExpirationCache, url: &str, age: Duration) {
        let file = fs::File::options()
            .write(true)
            .open(cache.path_for(url))
            .unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_round_trip_before_expiry() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::from_secs(60));
        let original = sample_response();

        cache.save_to_cache(URL, &original).unwrap();
        let cached = cache.get_from_cache(URL).unwrap().unwrap();

        assert_eq!(cached.status(), original.status());
        assert_eq!(cached.headers(), original.headers());
        assert_eq!(cached.raw_body(), original.raw_body());
    }

    #[test]
    fn test_missing_entry_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::from_secs(60));

        assert!(!cache.is_in_cache(URL).unwrap());
        assert!(cache.get_from_cache(URL).unwrap().is_none());
    }

    #[test]
    fn test_entry_expires_after_max_age() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::from_secs(10));
        cache.save_to_cache(URL, &sample_response()).unwrap();

        set_age(&cache, URL, Duration::from_secs(9));
        assert!(cache.is_in_cache(URL).unwrap());

        set_age(&cache, URL, Duration::from_secs(11));
        assert!(!cache.is_in_cache(URL).unwrap());
        assert!(cache.get_from_cache(URL).unwrap().is_none());
    }

    #[test]
    fn test_zero_max_age_never_expires() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::ZERO);
        cache.save_to_cache(URL, &sample_response()).unwrap();

        set_age(&cache, URL, Duration::from_secs(365 * 24 * 60 * 60));
        assert!(cache.is_in_cache(URL).unwrap());
    }

    #[test]
    fn test_is_fresh_boundaries() {
        let max = Duration::from_secs(10);
        assert!(is_fresh(Duration::from_secs(9), max));
        assert!(!is_fresh(Duration::from_secs(10), max));
        assert!(!is_fresh(Duration::from_secs(11), max));
        assert!(is_fresh(Duration::from_secs(1_000), Duration::ZERO));
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::ZERO);

        cache
            .save_to_cache(URL, &Response::new(200, [("a", "1")], b"first".to_vec()))
            .unwrap();
        cache
            .save_to_cache(URL, &Response::new(201, [("b", "2")], b"second".to_vec()))
            .unwrap();

        let cached = cache.get_from_cache(URL).unwrap().unwrap();
        assert_eq!(cached.status(), 201);
        assert_eq!(cached.header("a"), None);
        assert_eq!(cached.raw_body(), b"second");

        // Only the entry file remains; temp files were renamed away
        let files: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_entry_file_named_by_url_hash() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path().join("nested/dir"), Duration::ZERO);
        cache.save_to_cache(URL, &sample_response()).unwrap();

        let expected = tmp
            .path()
            .join("nested/dir")
            .join(format!("{}.webcache", crate::cache::cache_key(URL)));
        assert!(expected.is_file());
    }

    #[test]
    fn test_urls_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let cache = FixedExpirationCache::with_dir(tmp.path(), Duration::ZERO);

        cache
            .save_to_cache("https://a/", &Response::new(200, [("k", "a")], b"a".to_vec()))
            .unwrap();

        assert!(cache.is_in_cache("https://a/").unwrap());
        assert!(!cache.is_in_cache("https://b/").unwrap());
    }

    #[test]
    fn test_new_uses_temp_dir() {
        let cache = FixedExpirationCache::new(Duration::from_secs(5)).unwrap();
        assert_eq!(cache.dir(), std::env::temp_dir());
        assert_eq!(cache.max_age(), Duration::from_secs(5));
    }
}

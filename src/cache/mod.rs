//! Cache module for persisting forecast responses between requests and runs
//!
//! Two interchangeable backends implement [`CacheStore`]: a Redis connection
//! ([`RedisStore`]) and a single local JSON file ([`DocumentStore`]). Which one
//! is used is decided once at startup by [`open_cache`]: Redis is tried first
//! and the local file is the fallback. Neither backend ever returns an error
//! to the caller; failures surface as `None`, `false` or a [`CacheStatus`].

mod document;
mod redis;
mod sweep;

pub use document::DocumentStore;
pub use self::redis::RedisStore;
pub use sweep::{SweepGuard, SweepPolicy};

use std::path::Path;
use thiserror::Error;

use crate::data::Document;

/// Key holding the location of the last forecast that was served
pub const LAST_LOCATION_KEY: &str = "last_location";
/// Key holding the persisted response language
pub const LANG_KEY: &str = "lang";
/// Key holding the persisted unit system
pub const UNITS_KEY: &str = "units";

/// Control keys that share the key space with location names
pub const RESERVED_KEYS: [&str; 3] = [LAST_LOCATION_KEY, LANG_KEY, UNITS_KEY];

/// Time-to-live of every cache entry, in hours
pub const CACHE_TTL_HOURS: i64 = 12;

/// Returns true if `key` is one of the control keys
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Clears a stale `FailedToUpdate` after an operation succeeded
///
/// Other states are left alone: a backend that never connected stays marked.
pub(crate) fn recover(status: &mut CacheStatus, healthy: CacheStatus) {
    if *status == CacheStatus::FailedToUpdate {
        *status = healthy;
    }
}

/// Connection state of a cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Has not tried to connect yet
    NotInitialized,
    /// Backend not running or unreachable; must not be used
    FailedToConnect,
    /// Connected to the network backend
    Connected,
    /// A read or write failed, the backend itself is still usable
    FailedToUpdate,
    /// Using the local file backend
    Idle,
}

/// Errors raised inside the cache backends
///
/// These never leave the backends; they are logged and folded into the
/// backend's [`CacheStatus`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Storage for cached forecast documents and control values
///
/// All operations are infallible from the caller's point of view. Backends
/// are `Send + Sync` and serialize access internally.
pub trait CacheStore: Send + Sync {
    /// Reads a string value
    fn get_string(&self, key: &str) -> Option<String>;

    /// Reads a document value
    fn get_document(&self, key: &str) -> Option<Document>;

    /// Stores a string value, returning false if the backend is unavailable
    fn put_string(&self, key: &str, value: &str) -> bool;

    /// Stores a document value, returning false if the backend is unavailable
    fn put_document(&self, key: &str, value: &Document) -> bool;

    /// Current backend state
    fn status(&self) -> CacheStatus;

    /// Releases the connection or flushes the file; safe to call repeatedly
    fn dispose(&self);
}

/// Opens the cache backend for this run
///
/// Tries Redis when a URL is configured; if that connection fails, or no URL
/// is given, falls back to the local file at `file`. Check
/// [`CacheStore::status`] to see which backend was chosen.
pub fn open_cache(redis_url: Option<&str>, file: &Path) -> Box<dyn CacheStore> {
    if let Some(url) = redis_url {
        let store = RedisStore::connect(url);
        if store.status() == CacheStatus::Connected {
            tracing::info!("Using Redis cache at {}", url);
            return Box::new(store);
        }
        tracing::warn!(
            "Redis cache at {} unavailable, falling back to {}",
            url,
            file.display()
        );
    }

    tracing::info!("Using local cache file {}", file.display());
    Box::new(DocumentStore::open(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("last_location"));
        assert!(is_reserved_key("lang"));
        assert!(is_reserved_key("units"));
        assert!(!is_reserved_key("Paris"));
        assert!(!is_reserved_key("Units"));
    }

    #[test]
    fn test_recover_clears_only_update_failures() {
        let mut status = CacheStatus::FailedToUpdate;
        recover(&mut status, CacheStatus::Connected);
        assert_eq!(status, CacheStatus::Connected);

        let mut status = CacheStatus::FailedToConnect;
        recover(&mut status, CacheStatus::Connected);
        assert_eq!(status, CacheStatus::FailedToConnect);

        let mut status = CacheStatus::Idle;
        recover(&mut status, CacheStatus::Connected);
        assert_eq!(status, CacheStatus::Idle);
    }

    #[test]
    fn test_open_cache_without_redis_uses_document_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = open_cache(None, &temp_dir.path().join("cache.json"));

        assert_eq!(cache.status(), CacheStatus::Idle);
        assert!(cache.put_string("lang", "en"));
        assert_eq!(cache.get_string("lang").as_deref(), Some("en"));
    }

    #[test]
    fn test_open_cache_falls_back_when_redis_unreachable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = open_cache(
            Some("redis://127.0.0.1:1/"),
            &temp_dir.path().join("cache.json"),
        );

        assert_eq!(cache.status(), CacheStatus::Idle);
        assert!(cache.put_string("units", "metric"));
    }
}

//! Redis cache backend
//!
//! Every value is stored as a string with a 12 hour expiry set by the same
//! `SET ... EX` command, so a key is never left without its TTL. Documents
//! are stored as their JSON text.

use parking_lot::Mutex;
use std::time::Duration;

use super::{recover, CacheError, CacheStatus, CacheStore, CACHE_TTL_HOURS};
use crate::data::Document;

/// Timeout for connecting and for each command
pub const CONNECT_TIMEOUT_SECS: u64 = 2;

struct RedisState {
    connection: Option<::redis::Connection>,
    status: CacheStatus,
}

/// Cache backend backed by a Redis server
pub struct RedisStore {
    state: Mutex<RedisState>,
    ttl_secs: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("status", &self.status())
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl RedisStore {
    /// Connects to the server at `url` (e.g. `redis://127.0.0.1:6379/`)
    ///
    /// Never fails: on error the store is returned with status
    /// [`CacheStatus::FailedToConnect`] and every operation becomes a no-op.
    pub fn connect(url: &str) -> Self {
        Self::connect_with_timeout(url, Duration::from_secs(CONNECT_TIMEOUT_SECS))
    }

    pub fn connect_with_timeout(url: &str, timeout: Duration) -> Self {
        let (connection, status) = match open_connection(url, timeout) {
            Ok(connection) => (Some(connection), CacheStatus::Connected),
            Err(e) => {
                tracing::warn!("Could not connect to Redis at {}: {}", url, e);
                (None, CacheStatus::FailedToConnect)
            }
        };

        Self {
            state: Mutex::new(RedisState { connection, status }),
            ttl_secs: (CACHE_TTL_HOURS * 60 * 60) as u64,
        }
    }
}

fn open_connection(url: &str, timeout: Duration) -> Result<::redis::Connection, CacheError> {
    let client = ::redis::Client::open(url)?;
    let mut connection = client.get_connection_with_timeout(timeout)?;
    connection.set_read_timeout(Some(timeout))?;
    connection.set_write_timeout(Some(timeout))?;
    ::redis::cmd("PING").query::<String>(&mut connection)?;
    Ok(connection)
}

impl CacheStore for RedisStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        let connection = state.connection.as_mut()?;
        match ::redis::cmd("GET")
            .arg(key)
            .query::<Option<String>>(connection)
        {
            Ok(value) => {
                recover(&mut state.status, CacheStatus::Connected);
                value
            }
            Err(e) => {
                tracing::warn!("Redis GET {} failed: {}", key, e);
                state.status = CacheStatus::FailedToUpdate;
                None
            }
        }
    }

    fn get_document(&self, key: &str) -> Option<Document> {
        let text = self.get_string(key)?;
        match serde_json::from_str(&text) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!("Redis key {} does not hold a JSON object: {}", key, e);
                None
            }
        }
    }

    fn put_string(&self, key: &str, value: &str) -> bool {
        let mut state = self.state.lock();
        let Some(connection) = state.connection.as_mut() else {
            return false;
        };
        match ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(self.ttl_secs)
            .query::<()>(connection)
        {
            Ok(()) => {
                recover(&mut state.status, CacheStatus::Connected);
                true
            }
            Err(e) => {
                tracing::warn!("Redis SET {} failed: {}", key, e);
                state.status = CacheStatus::FailedToUpdate;
                false
            }
        }
    }

    fn put_document(&self, key: &str, value: &Document) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.put_string(key, &text),
            Err(e) => {
                tracing::warn!("Could not serialize document for {}: {}", key, e);
                false
            }
        }
    }

    fn status(&self) -> CacheStatus {
        self.state.lock().status
    }

    fn dispose(&self) {
        if self.state.lock().connection.take().is_some() {
            tracing::debug!("Closed Redis connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unreachable_server_fails_to_connect() {
        let store = RedisStore::connect_with_timeout("redis://127.0.0.1:1/", Duration::from_millis(200));

        assert_eq!(store.status(), CacheStatus::FailedToConnect);
    }

    #[test]
    fn test_invalid_url_fails_to_connect() {
        let store = RedisStore::connect("not a redis url");

        assert_eq!(store.status(), CacheStatus::FailedToConnect);
    }

    #[test]
    fn test_disconnected_store_is_inert() {
        let store = RedisStore::connect_with_timeout("redis://127.0.0.1:1/", Duration::from_millis(200));
        let document = json!({"address": "Paris"}).as_object().cloned().unwrap();

        assert!(!store.put_string("last_location", "Paris"));
        assert!(!store.put_document("Paris", &document));
        assert!(store.get_string("last_location").is_none());
        assert!(store.get_document("Paris").is_none());
        // Reads and writes must not change the status of a dead backend
        assert_eq!(store.status(), CacheStatus::FailedToConnect);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let store = RedisStore::connect_with_timeout("redis://127.0.0.1:1/", Duration::from_millis(200));
        store.dispose();
        store.dispose();
        assert_eq!(store.status(), CacheStatus::FailedToConnect);
    }
}

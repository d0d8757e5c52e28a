//! Local JSON file cache backend
//!
//! Keeps every value in memory together with a per-key write timestamp and
//! mirrors both to a single file:
//!
//! ```json
//! { "timestamps": { "Paris": 1704067200000 }, "body": { "Paris": { ... } } }
//! ```
//!
//! Entries older than the TTL are removed by a lazy sweep (see
//! [`SweepGuard`]). The file is rewritten when a sweep removes something and
//! on [`CacheStore::dispose`].

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::sweep::{expired_keys, SweepGuard, SweepPolicy};
use super::{recover, CacheError, CacheStatus, CacheStore};
use crate::data::Document;

/// On-disk layout of the cache file
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    /// Write time of each key, in epoch milliseconds
    #[serde(default)]
    timestamps: BTreeMap<String, i64>,
    /// Cached values: strings or nested documents
    #[serde(default)]
    body: Document,
}

/// Mutable state, guarded by one mutex so sweeps and reads never interleave
#[derive(Debug)]
struct DocumentState {
    file: CacheFile,
    guard: SweepGuard,
    status: CacheStatus,
    /// Set when memory holds changes that are not on disk yet
    dirty: bool,
}

/// Cache backend storing everything in one JSON file
#[derive(Debug)]
pub struct DocumentStore {
    /// File the cache is mirrored to
    path: PathBuf,
    policy: SweepPolicy,
    state: Mutex<DocumentState>,
}

impl DocumentStore {
    /// Opens the cache file at `path` with the default 12h TTL / 30min sweep
    ///
    /// A missing file gives an empty cache. A file that cannot be parsed is
    /// deleted and the cache starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, SweepPolicy::default())
    }

    /// Opens the cache file with a custom expiry policy
    pub fn with_policy(path: impl Into<PathBuf>, policy: SweepPolicy) -> Self {
        Self::open_at(path.into(), policy, Utc::now())
    }

    /// Default cache file location (`~/.cache/weatherdesk/cache.json` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "weatherdesk")?;
        Some(project_dirs.cache_dir().join("cache.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn open_at(path: PathBuf, policy: SweepPolicy, now: DateTime<Utc>) -> Self {
        let file = match load(&path) {
            Ok(Some(file)) => {
                tracing::info!("Loaded cache file {}", path.display());
                file
            }
            Ok(None) => CacheFile::default(),
            Err(CacheError::Serialization(e)) => {
                tracing::warn!("Invalid cache file {}: {}; deleting it", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("Could not delete {}: {}", path.display(), e);
                }
                CacheFile::default()
            }
            Err(e) => {
                tracing::warn!("Could not read cache file {}: {}", path.display(), e);
                CacheFile::default()
            }
        };

        let mut state = DocumentState {
            file,
            guard: SweepGuard::new(now, policy.scan_interval),
            status: CacheStatus::Idle,
            dirty: false,
        };

        // Entries may have expired while the application was closed
        if sweep(&mut state, now, &policy) > 0 {
            save(&path, &mut state);
        }

        Self {
            path,
            policy,
            state: Mutex::new(state),
        }
    }

    /// Reads a raw value at the given time, sweeping first if one is due
    pub(crate) fn get_value_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let mut state = self.state.lock();
        self.refresh(&mut state, now);
        state.file.body.get(key).cloned()
    }

    /// Writes a raw value stamped with the given time, sweeping first if one is due
    pub(crate) fn put_value_at(&self, key: &str, value: Value, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        self.refresh(&mut state, now);
        state.file.body.insert(key.to_string(), value);
        state
            .file
            .timestamps
            .insert(key.to_string(), now.timestamp_millis());
        state.dirty = true;
        true
    }

    fn refresh(&self, state: &mut DocumentState, now: DateTime<Utc>) {
        if !state.guard.check(now) {
            return;
        }
        if sweep(state, now, &self.policy) > 0 {
            save(&self.path, state);
        }
    }
}

impl CacheStore for DocumentStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get_value_at(key, Utc::now())? {
            Value::String(s) => Some(s),
            other => {
                tracing::debug!("Cache key {} is not a string: {}", key, other);
                None
            }
        }
    }

    fn get_document(&self, key: &str) -> Option<Document> {
        match self.get_value_at(key, Utc::now())? {
            Value::Object(document) => Some(document),
            // Documents written as text by older runs
            Value::String(s) => serde_json::from_str(&s).ok(),
            other => {
                tracing::debug!("Cache key {} is not a document: {}", key, other);
                None
            }
        }
    }

    fn put_string(&self, key: &str, value: &str) -> bool {
        self.put_value_at(key, Value::String(value.to_string()), Utc::now())
    }

    fn put_document(&self, key: &str, value: &Document) -> bool {
        self.put_value_at(key, Value::Object(value.clone()), Utc::now())
    }

    fn status(&self) -> CacheStatus {
        self.state.lock().status
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        save(&self.path, &mut state);
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.dirty {
            save(&self.path, state);
        }
    }
}

/// Reads and parses the cache file; `Ok(None)` if it does not exist
fn load(path: &Path) -> Result<Option<CacheFile>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    // Bad encoding is reported by the parser, so it counts as corruption
    let content = fs::read(path)?;
    let file = serde_json::from_slice(&content)?;
    Ok(Some(file))
}

/// Removes expired keys from both maps, returning how many were removed
fn sweep(state: &mut DocumentState, now: DateTime<Utc>, policy: &SweepPolicy) -> usize {
    let expired = expired_keys(&state.file.timestamps, now, policy.ttl);
    for key in &expired {
        state.file.body.remove(key);
        state.file.timestamps.remove(key);
    }

    if expired.is_empty() {
        tracing::debug!("Cache sweep: nothing to clean");
    } else {
        tracing::info!("Cache sweep removed {} expired keys", expired.len());
        state.dirty = true;
    }
    expired.len()
}

/// Writes the full state to disk, recording failures in the status
fn save(path: &Path, state: &mut DocumentState) {
    match write_file(path, &state.file) {
        Ok(()) => {
            state.dirty = false;
            recover(&mut state.status, CacheStatus::Idle);
            tracing::debug!("Saved cache file {}", path.display());
        }
        Err(e) => {
            state.status = CacheStatus::FailedToUpdate;
            tracing::warn!("Could not save cache file {}: {}", path.display(), e);
        }
    }
}

fn write_file(path: &Path, file: &CacheFile) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(file)?;
    fs::write(path, json)?;
    Ok(())
}

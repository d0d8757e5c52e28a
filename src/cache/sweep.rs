//! Lazy expiry of local cache entries
//!
//! There is no background timer. Every cache access asks the [`SweepGuard`]
//! whether a scan interval has passed since the last sweep; only then are
//! entries older than the TTL looked for and removed.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::CACHE_TTL_HOURS;

/// Minimum time between two sweeps, in minutes
pub const SCAN_INTERVAL_MINUTES: i64 = 30;

/// How long entries live and how often expiry is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Age after which an entry is eligible for removal
    pub ttl: Duration,
    /// Minimum time between two sweeps
    pub scan_interval: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(CACHE_TTL_HOURS),
            scan_interval: Duration::minutes(SCAN_INTERVAL_MINUTES),
        }
    }
}

/// Tracks when the last sweep ran
#[derive(Debug, Clone)]
pub struct SweepGuard {
    last_update: DateTime<Utc>,
    scan_interval: Duration,
}

impl SweepGuard {
    pub fn new(now: DateTime<Utc>, scan_interval: Duration) -> Self {
        Self {
            last_update: now,
            scan_interval,
        }
    }

    /// Returns true when at least one scan interval has passed since the
    /// last sweep, and records `now` as the new sweep time.
    ///
    /// The sweep time is advanced whether or not the sweep removes anything.
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.last_update >= self.scan_interval {
            self.last_update = now;
            true
        } else {
            false
        }
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }
}

/// Keys whose write timestamp (epoch millis) is older than `ttl` at `now`
pub fn expired_keys(
    timestamps: &BTreeMap<String, i64>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Vec<String> {
    let now_ms = now.timestamp_millis();
    let ttl_ms = ttl.num_milliseconds();
    timestamps
        .iter()
        .filter(|&(_, &written_ms)| now_ms - written_ms > ttl_ms)
        .map(|(key, _)| key.clone())
        .collect()
}

//! Minimum spacing between outbound forecast requests

use std::time::{Duration, Instant};

/// Default minimum time between two network calls, in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;

/// Allows at most one network call per cooldown window
///
/// The window is recorded when a call is *attempted*, so a failing upstream
/// is not hammered with retries.
#[derive(Debug, Clone)]
pub struct RequestThrottle {
    cooldown: Duration,
    last_request_at: Option<Instant>,
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}

impl RequestThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_request_at: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_request_at(&self) -> Option<Instant> {
        self.last_request_at
    }

    /// Returns true and records `now` if a call may be made
    ///
    /// Returns false, leaving the recorded time unchanged, if the previous
    /// call was less than one cooldown ago.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_request_at {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_request_at = Some(now);
        true
    }

    /// Time left until the next call is allowed
    pub fn remaining(&self, now: Instant) -> Duration {
        self.last_request_at.map_or(Duration::ZERO, |last| {
            self.cooldown
                .saturating_sub(now.saturating_duration_since(last))
        })
    }
}

//! Per-key sliding-window admission.
//!
//! Each key keeps the instants of its admitted requests. A check first drops
//! instants that fell out of the window ending at `now`, then admits only if
//! fewer than the quota remain. Denied checks leave the state untouched.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Seconds over which the quota is counted.
pub const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    #[error("Invalid rate limit: {0}")]
    InvalidLimit(u32),
}

pub trait RateLimiter: Send + Sync {
    /// Admit or deny one request for `key` at `now`.
    fn check(&self, key: &str, max_per_window: u32, now: DateTime<Utc>)
        -> Result<bool, LimiterError>;

    /// Drop keys with no request inside the window ending at `now`.
    /// Returns how many were dropped.
    fn evict_idle(&self, now: DateTime<Utc>) -> usize;
}

/// Sliding log of request instants per key.
///
/// Operations on one key are serialized by the map's shard lock; different
/// keys in different shards proceed in parallel.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    requests: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(Duration::seconds(WINDOW_SECS))
    }
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            requests: DashMap::new(),
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }

    fn purge(window: Duration, timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = timestamps.front() {
            if now - *oldest >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(
        &self,
        key: &str,
        max_per_window: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, LimiterError> {
        if max_per_window == 0 {
            return Err(LimiterError::InvalidLimit(max_per_window));
        }

        let mut timestamps = self.requests.entry(key.to_string()).or_default();
        Self::purge(self.window, &mut timestamps, now);

        if timestamps.len() >= max_per_window as usize {
            tracing::warn!(api_key = %key, "Rate limit exceeded");
            return Ok(false);
        }

        timestamps.push_back(now);
        Ok(true)
    }

    fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.requests.len();
        let window = self.window;
        self.requests.retain(|_, timestamps| {
            Self::purge(window, timestamps, now);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.requests.len())
    }
}

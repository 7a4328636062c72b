use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::errors::AuthError;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct RateLimiterEntry {
    count: u32,
    timestamp: DateTime<Utc>,
    blocked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Limited {
        message: String,
        retry_after: DateTime<Utc>,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Counts OTP send requests per phone number in a rolling window.
///
/// Entries live in process memory only. They are never tied to a user, so a
/// number can be throttled before anyone looks it up.
pub struct RateLimiter {
    entries: RwLock<HashMap<String, RateLimiterEntry>>,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(
            config.rate_limit_max_requests,
            Duration::seconds(config.rate_limit_window_seconds),
            clock,
        )
    }

    pub fn with_limits(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_requests,
            window,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check_limit(&self, key: &str) -> Result<RateLimitDecision, AuthError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
        let now = self.clock.now();

        let entry = match map.entry(key.to_string()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                slot.insert(RateLimiterEntry {
                    count: 1,
                    timestamp: now,
                    blocked: false,
                });
                return Ok(RateLimitDecision::Allowed);
            }
        };

        if now - entry.timestamp > self.window {
            entry.count = 1;
            entry.timestamp = now;
            entry.blocked = false;
            return Ok(RateLimitDecision::Allowed);
        }

        if entry.blocked {
            let retry_after = entry.timestamp + self.window;
            return Ok(RateLimitDecision::Limited {
                message: limited_message(retry_after - now),
                retry_after,
            });
        }

        entry.count += 1;
        if entry.count > self.max_requests {
            entry.blocked = true;
            let retry_after = now + self.window;
            return Ok(RateLimitDecision::Limited {
                message: limited_message(self.window),
                retry_after,
            });
        }

        Ok(RateLimitDecision::Allowed)
    }

    /// Drops every entry whose window has elapsed. Returns how many went.
    pub fn sweep(&self) -> Result<usize, AuthError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
        let now = self.clock.now();
        let before = map.len();
        map.retain(|_, entry| now - entry.timestamp <= self.window);
        Ok(before - map.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn limited_message(remaining: Duration) -> String {
    // Round up so "0 minutes" is never shown while still blocked.
    let minutes = ((remaining.num_seconds() + 59) / 60).max(1);
    format!(
        "Too many OTP requests. Please try again in {} minute{}",
        minutes,
        if minutes == 1 { "" } else { "s" }
    )
}

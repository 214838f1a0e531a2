//! Rate limiter for login attempts
//!
//! Failed logins are counted per username (case-insensitively) inside a
//! sliding window. Once the limit is reached further attempts are refused
//! until old failures fall out of the window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Failed attempts allowed inside one window
const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Window length in minutes
const DEFAULT_WINDOW_MINUTES: i64 = 15;

/// Login rate limiter
pub struct LoginRateLimiter {
    attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginRateLimiter {
    /// 5 failed attempts per 15 minutes
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ATTEMPTS, Duration::minutes(DEFAULT_WINDOW_MINUTES))
    }

    pub fn with_limits(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Whether `username` has used up its failed attempts
    pub async fn is_limited(&self, username: &str) -> bool {
        let cutoff = Utc::now() - self.window;
        let attempts = self.attempts.read().await;
        attempts
            .get(&username.to_lowercase())
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.max_attempts)
            .unwrap_or(false)
    }

    pub async fn record_failure(&self, username: &str) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        let times = attempts.entry(username.to_lowercase()).or_default();
        times.retain(|t| *t > cutoff);
        times.push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, username: &str) {
        self.attempts.write().await.remove(&username.to_lowercase());
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_usernames(&self) -> usize {
        self.attempts.read().await.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

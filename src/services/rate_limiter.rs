//! Login rate limiting
//!
//! Two sliding windows guard the login endpoint:
//! - failed attempts per username: 5 per 15 minutes
//! - attempts per client IP: 10 per minute
//!
//! State is in-process. `cleanup` should run periodically to drop idle keys.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

pub const USERNAME_LIMIT: usize = 5;
pub const USERNAME_WINDOW_MINUTES: i64 = 15;
pub const IP_LIMIT: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Event timestamps per key, trimmed to the window on every access
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        match events.get_mut(&key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        self.events.write().await.entry(key).or_default().push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        before - events.len()
    }

    async fn tracked(&self) -> usize {
        self.events.read().await.len()
    }
}

pub struct LoginRateLimiter {
    usernames: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            usernames: SlidingWindow::new(USERNAME_LIMIT, Duration::minutes(USERNAME_WINDOW_MINUTES)),
            ips: SlidingWindow::new(IP_LIMIT, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Usernames are compared case-insensitively
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames.is_limited(username.to_lowercase(), Utc::now()).await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames.record(username.to_lowercase(), Utc::now()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(ip, Utc::now()).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip, Utc::now()).await;
    }

    /// Drop keys with no events inside their window; returns how many went
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        self.usernames.cleanup(now).await + self.ips.cleanup(now).await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.usernames.tracked().await + self.ips.tracked().await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

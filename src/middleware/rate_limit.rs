//! Fixed-window request counting keyed by `(scope, client)`.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub requests: u32,
    pub window: Duration,
}

impl Limit {
    pub const fn per_minute(requests: u32) -> Self {
        Self { requests, window: Duration::from_secs(60) }
    }
}

pub const LOGIN: Limit = Limit::per_minute(5);
pub const TWO_FACTOR: Limit = Limit::per_minute(10);
pub const SCAN_API: Limit = Limit::per_minute(30);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request and returns `false` once `limit` is exceeded
    /// within the current window.
    pub fn check(&self, scope: &str, client: &str, limit: Limit) -> bool {
        self.check_at(scope, client, limit, Instant::now())
    }

    fn check_at(&self, scope: &str, client: &str, limit: Limit, now: Instant) -> bool {
        let mut window = self
            .windows
            .entry(format!("{scope}:{client}"))
            .or_insert_with(|| Window { started: now, count: 0 });

        if now.duration_since(window.started) >= limit.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= limit.requests {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drops windows idle for longer than `max_age`.
    pub fn purge(&self, max_age: Duration) {
        let now = Instant::now();
        self.windows.retain(|_, w| now.duration_since(w.started) < max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_until_window_passes() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let limit = Limit { requests: 2, window: Duration::from_secs(60) };

        assert!(limiter.check_at("login", "10.0.0.1", limit, start));
        assert!(limiter.check_at("login", "10.0.0.1", limit, start));
        assert!(!limiter.check_at("login", "10.0.0.1", limit, start + Duration::from_secs(30)));
        assert!(limiter.check_at("login", "10.0.0.1", limit, start + Duration::from_secs(61)));
    }

    #[test]
    fn scopes_and_clients_are_independent() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let limit = Limit { requests: 1, window: Duration::from_secs(60) };

        assert!(limiter.check_at("login", "a", limit, start));
        assert!(limiter.check_at("login", "b", limit, start));
        assert!(limiter.check_at("scan", "a", limit, start));
        assert!(!limiter.check_at("login", "a", limit, start));
    }

    #[test]
    fn purge_forgets_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.check("login", "a", LOGIN);
        limiter.purge(Duration::ZERO);
        assert!(limiter.windows.is_empty());
    }
}

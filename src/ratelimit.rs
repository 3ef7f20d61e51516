//! Fixed-window request limiting and failed-auth lockout over [`SharedCache`].

use crate::cache::{CacheError, SharedCache};
use axum::http::{self, HeaderMap, header::HeaderValue};
use std::{sync::Arc, time::Duration};

/// Longest client key kept; anything longer is cut (IPv6 text max).
const MAX_CLIENT_KEY_LEN: usize = 45;

fn header_value(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_secs: u64,
}

impl RateDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", header_value(self.limit));
        headers.insert("X-RateLimit-Remaining", header_value(self.remaining));
        headers.insert("X-RateLimit-Reset", header_value(self.reset_secs));
        if !self.allowed {
            headers.insert(http::header::RETRY_AFTER, header_value(self.reset_secs.max(1)));
        }
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    cache: Arc<dyn SharedCache>,
    max_requests: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(cache: Arc<dyn SharedCache>, max_requests: u64, window: Duration) -> Self {
        Self {
            cache,
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub async fn check(&self, subject: &str) -> Result<RateDecision, CacheError> {
        let counted = self
            .cache
            .incr_window(&format!("ratelimit:{subject}"), self.window)
            .await?;
        Ok(RateDecision {
            allowed: counted.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(counted.count),
            reset_secs: counted.resets_in_secs,
        })
    }
}

/// Counts failed authentications per client and locks the client out once
/// `max_attempts` is reached inside the window.
#[derive(Clone)]
pub struct LockoutGuard {
    cache: Arc<dyn SharedCache>,
    max_attempts: u64,
    window: Duration,
}

impl LockoutGuard {
    pub fn new(cache: Arc<dyn SharedCache>, max_attempts: u64, window: Duration) -> Self {
        Self {
            cache,
            max_attempts: max_attempts.max(1),
            window,
        }
    }

    fn key(client: &str) -> String {
        let client = match client.char_indices().nth(MAX_CLIENT_KEY_LEN) {
            Some((idx, _)) => &client[..idx],
            None => client,
        };
        format!("lockout:{client}")
    }

    /// Seconds left on an active lockout.
    pub async fn locked_for(&self, client: &str) -> Result<Option<u64>, CacheError> {
        let current = self.cache.peek_window(&Self::key(client)).await?;
        Ok(current
            .filter(|window| window.count >= self.max_attempts)
            .map(|window| window.resets_in_secs.max(1)))
    }

    /// Records one failure; returns the lockout length when this attempt trips it.
    pub async fn record_failure(&self, client: &str) -> Result<Option<u64>, CacheError> {
        let counted = self.cache.incr_window(&Self::key(client), self.window).await?;
        Ok((counted.count >= self.max_attempts).then_some(counted.resets_in_secs.max(1)))
    }

    pub async fn clear(&self, client: &str) -> Result<(), CacheError> {
        self.cache.delete(&Self::key(client)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn limiter_denies_after_max_requests() {
        let limiter =
            FixedWindowLimiter::new(Arc::new(MemoryCache::new()), 2, Duration::from_secs(60));
        let first = limiter.check("user-a").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check("user-a").await.unwrap().allowed);
        let third = limiter.check("user-a").await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(limiter.check("user-b").await.unwrap().allowed);

        let mut headers = HeaderMap::new();
        third.apply_headers(&mut headers);
        assert_eq!(headers["X-RateLimit-Limit"], "2");
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        assert!(headers.contains_key(http::header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn lockout_trips_and_clears() {
        let guard = LockoutGuard::new(Arc::new(MemoryCache::new()), 3, Duration::from_secs(900));
        assert_eq!(guard.record_failure("10.0.0.1").await.unwrap(), None);
        assert_eq!(guard.record_failure("10.0.0.1").await.unwrap(), None);
        assert_eq!(guard.locked_for("10.0.0.1").await.unwrap(), None);
        assert!(guard.record_failure("10.0.0.1").await.unwrap().is_some());
        let remaining = guard.locked_for("10.0.0.1").await.unwrap().unwrap();
        assert!(remaining > 0 && remaining <= 900);
        assert_eq!(guard.locked_for("10.0.0.2").await.unwrap(), None);

        guard.clear("10.0.0.1").await.unwrap();
        assert_eq!(guard.locked_for("10.0.0.1").await.unwrap(), None);
    }
}

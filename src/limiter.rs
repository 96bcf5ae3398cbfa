//! Sliding-window rate limiter
//!
//! Per-route quotas tracked in process memory. Write routes are keyed by a
//! credential prefix, registration by client IP. Buckets are pruned lazily
//! on every check and swept periodically by a background task.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::ApiError;

/// How much of a bearer token identifies its bucket. Enough to separate
/// agents without holding whole credentials in the hot map.
pub const KEY_PREFIX_LEN: usize = 32;

/// A named quota for one route.
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    pub name: &'static str,
    pub limit: u32,
    pub window: Duration,
}

pub const REGISTER: RoutePolicy = RoutePolicy {
    name: "register",
    limit: 5,
    window: Duration::from_secs(3600),
};

pub const IDEA_CREATE: RoutePolicy = RoutePolicy {
    name: "idea_create",
    limit: 10,
    window: Duration::from_secs(3600),
};

pub const CRITIQUE_CREATE: RoutePolicy = RoutePolicy {
    name: "critique_create",
    limit: 30,
    window: Duration::from_secs(3600),
};

/// In-memory sliding-window limiter shared across connections.
pub struct RateLimiter {
    buckets: DashMap<String, Vec<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Truncate a credential to its bucket key.
    pub fn credential_key(token: &str) -> String {
        token.chars().take(KEY_PREFIX_LEN).collect()
    }

    /// Record one request against `key` under `policy`. Over-quota requests
    /// are rejected without being recorded, so a client cannot extend its
    /// own penalty by retrying.
    pub fn check(&self, policy: RoutePolicy, key: &str) -> Result<(), ApiError> {
        self.check_at(policy, key, Instant::now())
    }

    fn check_at(&self, policy: RoutePolicy, key: &str, now: Instant) -> Result<(), ApiError> {
        let bucket_key = format!("{}:{}", policy.name, key);
        let mut bucket = self.buckets.entry(bucket_key).or_default();

        bucket.retain(|t| now.duration_since(*t) < policy.window);

        if bucket.len() >= policy.limit as usize {
            let oldest = bucket.first().copied().unwrap_or(now);
            let retry_after = policy
                .window
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(ApiError::RateLimited {
                limit: policy.limit,
                retry_after_seconds: retry_after,
            });
        }

        bucket.push(now);
        Ok(())
    }

    fn sweep(&self) {
        let now = Instant::now();
        // One hour is the longest configured window.
        let horizon = Duration::from_secs(3600);
        self.buckets
            .retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < horizon));
    }
}

/// Periodically drop buckets whose every entry has aged out.
pub fn spawn_cleanup_task(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let before = limiter.buckets.len();
            limiter.sweep();
            let after = limiter.buckets.len();
            if before != after {
                debug!("Rate limiter sweep: {} -> {} buckets", before, after);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_rejects_request_over_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..REGISTER.limit {
            limiter.check(REGISTER, "10.0.0.1").unwrap();
        }
        let err = limiter.check(REGISTER, "10.0.0.1").unwrap_err();
        match err {
            ApiError::RateLimited {
                limit,
                retry_after_seconds,
            } => {
                assert_eq!(limit, 5);
                assert!(retry_after_seconds >= 1);
                assert!(retry_after_seconds <= 3600);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn buckets_are_isolated_by_policy_and_key() {
        let limiter = RateLimiter::new();
        for _ in 0..REGISTER.limit {
            limiter.check(REGISTER, "10.0.0.1").unwrap();
        }
        // Same key under a different policy, different key under the same.
        limiter.check(IDEA_CREATE, "10.0.0.1").unwrap();
        limiter.check(REGISTER, "10.0.0.2").unwrap();
    }

    #[test]
    fn window_expiry_readmits_requests() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..IDEA_CREATE.limit {
            limiter.check_at(IDEA_CREATE, "k", start).unwrap();
        }
        assert!(limiter.check_at(IDEA_CREATE, "k", start).is_err());

        let later = start + IDEA_CREATE.window + Duration::from_secs(1);
        limiter.check_at(IDEA_CREATE, "k", later).unwrap();
    }

    #[test]
    fn rejected_requests_do_not_extend_the_penalty() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..REGISTER.limit {
            limiter.check_at(REGISTER, "k", start).unwrap();
        }
        for _ in 0..10 {
            assert!(limiter.check_at(REGISTER, "k", start).is_err());
        }
        let later = start + REGISTER.window + Duration::from_secs(1);
        limiter.check_at(REGISTER, "k", later).unwrap();
    }

    #[test]
    fn retry_after_tracks_the_oldest_recorded_request() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..REGISTER.limit {
            limiter.check_at(REGISTER, "k", start).unwrap();
        }

        // Half the window gone: half the window left to wait.
        let halfway = start + REGISTER.window / 2;
        match limiter.check_at(REGISTER, "k", halfway).unwrap_err() {
            ApiError::RateLimited {
                retry_after_seconds,
                ..
            } => assert_eq!(retry_after_seconds, (REGISTER.window / 2).as_secs()),
            other => panic!("expected RateLimited, got {:?}", other),
        }

        // Even at the window edge the caller is told to wait at least 1s.
        let edge = start + REGISTER.window - Duration::from_millis(1);
        match limiter.check_at(REGISTER, "k", edge).unwrap_err() {
            ApiError::RateLimited {
                retry_after_seconds,
                ..
            } => assert_eq!(retry_after_seconds, 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn credential_key_truncates_long_tokens() {
        let token = "rtbl_".to_string() + &"a".repeat(64);
        assert_eq!(RateLimiter::credential_key(&token).len(), KEY_PREFIX_LEN);
        assert_eq!(RateLimiter::credential_key("short"), "short");
    }
}

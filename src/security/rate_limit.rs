//! Fixed-window rate limiting keyed by (endpoint scope, client identity).
//!
//! Counters live in the tiered cache with a TTL equal to the window length.
//! The algorithm admits short bursts at window boundaries (up to twice the
//! nominal rate); that is accepted behavior, not a defect. Counter updates
//! race under concurrency and settle last-write-wins; a window may admit
//! slightly more than the ceiling, which the design also accepts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::cache::{TieredCache, keys};
use crate::config::{RateLimitSettings, WindowSettings};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl From<WindowSettings> for RateLimitPolicy {
    fn from(settings: WindowSettings) -> Self {
        Self {
            max_requests: settings.max_requests.get(),
            window: settings.window,
        }
    }
}

/// The predefined policies: strict for authentication, generous for general
/// API traffic, tight-and-short for search.
#[derive(Debug, Clone)]
pub struct PolicySet {
    pub auth: RateLimitPolicy,
    pub api: RateLimitPolicy,
    pub search: RateLimitPolicy,
}

impl From<&RateLimitSettings> for PolicySet {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            auth: settings.auth.into(),
            api: settings.api.into(),
            search: settings.search.into(),
        }
    }
}

impl PolicySet {
    /// Scope selection by path prefix; the scope name is part of the cache
    /// key, so each scope counts independently.
    pub fn for_path(&self, path: &str) -> (&'static str, RateLimitPolicy) {
        if path.starts_with("/api/auth") {
            ("auth", self.auth)
        } else if path.contains("/search") {
            ("search", self.search)
        } else {
            ("api", self.api)
        }
    }
}

/// Counter record stored in the cache, one per (scope, identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitRecord {
    count: u32,
    window_reset_at: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self, now: i64) -> u64 {
        (self.reset_at - now).max(1) as u64
    }
}

pub struct RateLimiter {
    cache: Arc<TieredCache>,
    /// Window-reset stamp per throttled key so each key logs one rejection
    /// per window instead of one per request.
    throttled: DashMap<String, i64>,
}

impl RateLimiter {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self {
            cache,
            throttled: DashMap::new(),
        }
    }

    /// Check and count one request. Rate limiting must never be a point of
    /// outage: an absent or unreadable counter simply starts a fresh window,
    /// so degraded cache tiers fail open.
    pub async fn check(
        &self,
        scope: &str,
        identity: &str,
        policy: RateLimitPolicy,
    ) -> RateLimitDecision {
        self.check_at(
            scope,
            identity,
            policy,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
        .await
    }

    async fn check_at(
        &self,
        scope: &str,
        identity: &str,
        policy: RateLimitPolicy,
        now: i64,
    ) -> RateLimitDecision {
        let key = keys::rate_limit(scope, identity);

        let record = match self.cache.get_value::<RateLimitRecord>(&key).await {
            Some(record) if now < record.window_reset_at => RateLimitRecord {
                count: record.count.saturating_add(1),
                window_reset_at: record.window_reset_at,
            },
            _ => RateLimitRecord {
                count: 1,
                window_reset_at: now + policy.window.as_secs() as i64,
            },
        };

        let ttl = Duration::from_secs((record.window_reset_at - now).max(1) as u64);
        self.cache.set_value(&key, &record, Some(ttl));

        let allowed = record.count <= policy.max_requests;
        let decision = RateLimitDecision {
            allowed,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(record.count),
            reset_at: record.window_reset_at,
        };

        if !allowed {
            counter!("verdura_rate_limit_rejected_total").increment(1);
            let first_in_window = self
                .throttled
                .insert(key.clone(), record.window_reset_at)
                .is_none_or(|previous| previous != record.window_reset_at);
            if first_in_window {
                warn!(
                    target: "verdura::security::rate_limit",
                    scope,
                    identity,
                    count = record.count,
                    limit = policy.max_requests,
                    reset_at = record.window_reset_at,
                    "Rate limit exceeded"
                );
            }
        }

        decision
    }
}

/// Client identity: first address in the forwarded-for chain, else the raw
/// connection address. Callers may substitute an authenticated user id for
/// per-user limits.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(raw) = forwarded.to_str()
        && let Some(first) = raw.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use crate::cache::CacheConfig;

    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(TieredCache::new(&CacheConfig::default(), None)))
    }

    fn policy(max_requests: u32, window_secs: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    #[tokio::test]
    async fn requests_count_down_and_the_ceiling_rejects() {
        let limiter = limiter();
        let policy = policy(3, 60);
        let now = 1_700_000_000;

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("api", "1.2.3.4", policy, now).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check_at("api", "1.2.3.4", policy, now).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, now + 60);
        assert!(decision.retry_after_secs(now) <= 60);
    }

    #[tokio::test]
    async fn a_fresh_window_resets_the_counter() {
        let limiter = limiter();
        let policy = policy(2, 60);
        let now = 1_700_000_000;

        for _ in 0..3 {
            limiter.check_at("api", "1.2.3.4", policy, now).await;
        }
        assert!(!limiter.check_at("api", "1.2.3.4", policy, now).await.allowed);

        let later = now + 61;
        let decision = limiter.check_at("api", "1.2.3.4", policy, later).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn five_auth_attempts_pass_and_the_sixth_is_throttled() {
        let limiter = limiter();
        let policy = policy(5, 900);
        let now = 1_700_000_000;

        for _ in 0..5 {
            assert!(
                limiter
                    .check_at("auth", "198.51.100.4", policy, now)
                    .await
                    .allowed
            );
        }

        let decision = limiter.check_at("auth", "198.51.100.4", policy, now).await;
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs(now) <= 900);
    }

    #[tokio::test]
    async fn identities_and_scopes_count_independently() {
        let limiter = limiter();
        let policy = policy(1, 60);
        let now = 1_700_000_000;

        assert!(limiter.check_at("api", "a", policy, now).await.allowed);
        assert!(!limiter.check_at("api", "a", policy, now).await.allowed);

        assert!(limiter.check_at("api", "b", policy, now).await.allowed);
        assert!(limiter.check_at("search", "a", policy, now).await.allowed);
    }

    #[test]
    fn identity_prefers_the_forwarded_chain() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let peer: SocketAddr = "192.0.2.1:443".parse().expect("addr");

        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.9");
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn path_scope_selection() {
        let policies = PolicySet {
            auth: policy(5, 900),
            api: policy(100, 60),
            search: policy(30, 10),
        };

        assert_eq!(policies.for_path("/api/auth/login").0, "auth");
        assert_eq!(policies.for_path("/api/products/search").0, "search");
        assert_eq!(policies.for_path("/api/products").0, "api");
    }
}

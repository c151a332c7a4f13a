//! The two-level cache facade.
//!
//! Lookup order is local → distributed → source of truth. Distributed-tier
//! failures never propagate to callers: a failed read is a miss, a failed
//! write is skipped, and both are logged at warning level with the key.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use super::config::CacheConfig;
use super::local::LocalTier;
use super::remote::{RemoteTier, TierHealth};

pub struct TieredCache {
    local: LocalTier,
    remote: Option<Arc<RemoteTier>>,
    default_ttl: Duration,
}

impl TieredCache {
    pub fn new(config: &CacheConfig, remote: Option<Arc<RemoteTier>>) -> Self {
        Self {
            local: LocalTier::new(config),
            remote,
            default_ttl: config.default_ttl,
        }
    }

    fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }

    /// Look up `key`, falling back to `fetch` on a full miss. The fetched
    /// value is written to the local tier synchronously and to the
    /// distributed tier fire-and-forget; callers never wait on Redis.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read_tiers(key).await {
            return Ok(value);
        }

        counter!("verdura_cache_fetch_total").increment(1);
        let value = fetch().await?;
        self.write_tiers(key, &value, ttl);
        Ok(value)
    }

    /// Tier lookup without a fetch fallback.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_tiers(key).await
    }

    pub fn set_value<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        self.write_tiers(key, value, ttl);
    }

    pub async fn delete(&self, key: &str) {
        self.local.delete(key);
        if let Some(remote) = &self.remote
            && let Err(err) = remote.delete(key).await
        {
            counter!("verdura_cache_remote_error_total").increment(1);
            warn!(
                target: "verdura::cache",
                key,
                error = %err,
                "Distributed tier delete failed"
            );
        }
    }

    /// Clear the entire local tier (no pattern matching locally) and delete
    /// all distributed keys matching `pattern`.
    pub async fn invalidate(&self, pattern: &str) {
        self.local.flush_all();
        if let Some(remote) = &self.remote {
            match remote.delete_pattern(pattern).await {
                Ok(count) => {
                    tracing::debug!(
                        target: "verdura::cache",
                        pattern,
                        deleted = count,
                        "Invalidated distributed keys"
                    );
                }
                Err(err) => {
                    counter!("verdura_cache_remote_error_total").increment(1);
                    warn!(
                        target: "verdura::cache",
                        pattern,
                        error = %err,
                        "Distributed tier invalidation failed"
                    );
                }
            }
        }
    }

    /// Health of the distributed tier. A cache running local-only reports
    /// healthy with no latency figure.
    pub async fn health(&self) -> TierHealth {
        match &self.remote {
            Some(remote) => remote.ping().await,
            None => TierHealth {
                healthy: true,
                latency_ms: None,
                error: None,
            },
        }
    }

    pub fn has_remote_tier(&self) -> bool {
        self.remote.is_some()
    }

    async fn read_tiers<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(bytes) = self.local.get(key) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    counter!("verdura_cache_local_hit_total").increment(1);
                    return Some(value);
                }
                // A local entry we wrote but cannot decode is dead weight.
                Err(_) => self.local.delete(key),
            }
        }
        counter!("verdura_cache_local_miss_total").increment(1);

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    counter!("verdura_cache_remote_hit_total").increment(1);
                    // Best-effort backfill so the next read stays in-process.
                    self.local
                        .set(key.to_string(), Bytes::from(bytes), self.default_ttl);
                    Some(value)
                }
                Err(err) => {
                    warn!(
                        target: "verdura::cache",
                        key,
                        error = %err,
                        "Corrupted distributed cache value; deleting and treating as miss"
                    );
                    if let Err(err) = remote.delete(key).await {
                        warn!(
                            target: "verdura::cache",
                            key,
                            error = %err,
                            "Failed to delete corrupted distributed value"
                        );
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                counter!("verdura_cache_remote_error_total").increment(1);
                warn!(
                    target: "verdura::cache",
                    key,
                    error = %err,
                    "Distributed tier read failed; treating as miss"
                );
                None
            }
        }
    }

    fn write_tiers<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                warn!(
                    target: "verdura::cache",
                    key,
                    error = %err,
                    "Failed to encode cache value; skipping write"
                );
                return;
            }
        };
        let ttl = self.ttl_or_default(ttl);

        self.local.set(key.to_string(), bytes.clone(), ttl);

        if let Some(remote) = &self.remote {
            let remote = remote.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(err) = remote.set(&key, &bytes, ttl).await {
                    counter!("verdura_cache_remote_error_total").increment(1);
                    warn!(
                        target: "verdura::cache",
                        key,
                        error = %err,
                        "Distributed tier write failed; local tier still serves"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn local_only() -> TieredCache {
        TieredCache::new(&CacheConfig::default(), None)
    }

    fn with_unreachable_remote() -> TieredCache {
        let config = CacheConfig {
            reconnect_cooldown: Duration::ZERO,
            max_reconnect_attempts: 1,
            ..CacheConfig::default()
        };
        let remote = Arc::new(RemoteTier::new("redis://127.0.0.1:1/".to_string(), &config));
        TieredCache::new(&config, Some(remote))
    }

    #[tokio::test]
    async fn set_then_get_skips_the_fetch_function() {
        let cache = local_only();
        cache.set_value("answer", &41_u32, None);

        let fetches = AtomicUsize::new(0);
        let value: Result<u32, ()> = cache
            .get_or_fetch("answer", None, || {
                fetches.fetch_add(1, Ordering::SeqCst);
                async { Ok(99) }
            })
            .await;

        assert_eq!(value, Ok(41));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_miss_fetches_and_caches() {
        let cache = local_only();

        let value: Result<String, ()> = cache
            .get_or_fetch("greeting", None, || async { Ok("hello".to_string()) })
            .await;
        assert_eq!(value.as_deref(), Ok("hello"));

        let cached: Option<String> = cache.get_value("greeting").await;
        assert_eq!(cached.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_nothing_is_cached() {
        let cache = local_only();

        let value: Result<u32, &str> = cache
            .get_or_fetch("broken", None, || async { Err("fetch failed") })
            .await;
        assert_eq!(value, Err("fetch failed"));
        assert!(cache.get_value::<u32>("broken").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_degrades_to_local_only() {
        let cache = with_unreachable_remote();

        cache.set_value("k", &7_u32, None);
        let value: Result<u32, ()> = cache.get_or_fetch("k", None, || async { Ok(0) }).await;
        assert_eq!(value, Ok(7));

        // Writes and invalidation complete despite the dead tier.
        cache.delete("k").await;
        cache.invalidate("*").await;
        assert!(cache.get_value::<u32>("k").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_clears_the_local_tier() {
        let cache = local_only();
        cache.set_value("product:1", &1_u32, None);
        cache.set_value("orders:1", &2_u32, None);

        cache.invalidate("product*").await;

        // Local invalidation is coarse: everything goes.
        assert!(cache.get_value::<u32>("product:1").await.is_none());
        assert!(cache.get_value::<u32>("orders:1").await.is_none());
    }
}

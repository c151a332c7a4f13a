//! Local cache tier: in-process LRU with per-entry expiry.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::local";

#[derive(Clone)]
struct LocalEntry {
    bytes: Bytes,
    expires_at: Instant,
}

/// In-process tier. Entries carry their own deadline; an expired entry is
/// removed on the read that observes it.
pub struct LocalTier {
    entries: RwLock<LruCache<String, LocalEntry>>,
}

impl LocalTier {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.local_capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.bytes.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, bytes: Bytes, ttl: Duration) {
        let entry = LocalEntry {
            bytes,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").put(key, entry);
    }

    pub fn delete(&self, key: &str) {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
    }

    /// Coarse invalidation: the local tier has no pattern index, so the whole
    /// tier is flushed and repopulates from the tiers below.
    pub fn flush_all(&self) {
        rw_write(&self.entries, SOURCE, "flush_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier() -> LocalTier {
        LocalTier::new(&CacheConfig::default())
    }

    #[test]
    fn set_then_get_round_trips() {
        let tier = tier();
        tier.set("k".into(), Bytes::from_static(b"v"), Duration::from_secs(60));
        assert_eq!(tier.get("k"), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn expired_entries_read_as_misses_and_are_dropped() {
        let tier = tier();
        tier.set("k".into(), Bytes::from_static(b"v"), Duration::ZERO);
        assert!(tier.get("k").is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn flush_all_clears_every_entry() {
        let tier = tier();
        tier.set("a".into(), Bytes::from_static(b"1"), Duration::from_secs(60));
        tier.set("b".into(), Bytes::from_static(b"2"), Duration::from_secs(60));
        tier.flush_all();
        assert!(tier.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let config = CacheConfig {
            local_capacity: std::num::NonZeroUsize::new(2).expect("non-zero"),
            ..CacheConfig::default()
        };
        let tier = LocalTier::new(&config);
        tier.set("a".into(), Bytes::from_static(b"1"), Duration::from_secs(60));
        tier.set("b".into(), Bytes::from_static(b"2"), Duration::from_secs(60));
        tier.set("c".into(), Bytes::from_static(b"3"), Duration::from_secs(60));

        assert!(tier.get("a").is_none());
        assert!(tier.get("b").is_some());
        assert!(tier.get("c").is_some());
    }
}

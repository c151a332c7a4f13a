//! Cache key builders. Keys are namespaced by concern so pattern invalidation
//! can target one concern without sweeping the others.

use std::hash::{DefaultHasher, Hash, Hasher};

use uuid::Uuid;

/// Pattern matching every product-derived key (single records and lists).
pub const PRODUCT_PATTERN: &str = "product*";

pub fn product(id: Uuid) -> String {
    format!("product:{id}")
}

pub fn product_list(filter_hash: u64) -> String {
    format!("products:list:{filter_hash:016x}")
}

pub fn rate_limit(scope: &str, identity: &str) -> String {
    format!("ratelimit:{scope}:{identity}")
}

/// Stable within a process run; list keys only need to agree between readers
/// and the writers that invalidate them.
pub fn hash_of(value: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_keys_match_the_invalidation_pattern() {
        let id = Uuid::new_v4();
        let single = product(id);
        let list = product_list(42);

        let prefix = PRODUCT_PATTERN.trim_end_matches('*');
        assert!(single.starts_with(prefix));
        assert!(list.starts_with(prefix));
    }

    #[test]
    fn rate_limit_keys_are_scoped() {
        assert_eq!(rate_limit("auth", "10.0.0.1"), "ratelimit:auth:10.0.0.1");
    }
}

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::config::CacheSettings;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub local_capacity: NonZeroUsize,
    pub default_ttl: Duration,
    pub redis_url: Option<String>,
    pub reconnect_cooldown: Duration,
    pub max_reconnect_attempts: u32,
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_capacity: NonZeroUsize::new(2048).expect("non-zero capacity"),
            default_ttl: Duration::from_secs(300),
            redis_url: None,
            reconnect_cooldown: Duration::from_secs(5),
            max_reconnect_attempts: 10,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            local_capacity: settings.local_capacity,
            default_ttl: settings.default_ttl,
            redis_url: settings.redis_url.clone(),
            reconnect_cooldown: settings.reconnect_cooldown,
            max_reconnect_attempts: settings.max_reconnect_attempts,
        }
    }
}

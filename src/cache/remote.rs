//! Distributed cache tier backed by Redis.
//!
//! Connectivity is tracked as an explicit state machine with a reconnect
//! cooldown and a capped automatic retry count. After the cap is exhausted,
//! reconnection only happens through an explicit [`RemoteTier::reconnect`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::remote";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("distributed tier unavailable")]
    Unavailable,
    #[error("redis command failed: {0}")]
    Command(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of a health probe round-trip.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TierHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TierHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

struct ConnMeta {
    state: ConnState,
    last_attempt: Option<Instant>,
    attempts: u32,
}

pub struct RemoteTier {
    url: String,
    cooldown: Duration,
    max_attempts: u32,
    manager: tokio::sync::RwLock<Option<ConnectionManager>>,
    meta: Mutex<ConnMeta>,
}

impl RemoteTier {
    pub fn new(url: String, config: &CacheConfig) -> Self {
        Self {
            url,
            cooldown: config.reconnect_cooldown,
            max_attempts: config.max_reconnect_attempts,
            manager: tokio::sync::RwLock::new(None),
            meta: Mutex::new(ConnMeta {
                state: ConnState::Disconnected,
                last_attempt: None,
                attempts: 0,
            }),
        }
    }

    pub fn state(&self) -> ConnState {
        mutex_lock(&self.meta, SOURCE, "state").state
    }

    /// Explicit reconnect requested from outside the cooldown policy; resets
    /// the attempt budget.
    pub async fn reconnect(&self) -> Result<(), RemoteError> {
        {
            let mut meta = mutex_lock(&self.meta, SOURCE, "reconnect");
            meta.attempts = 0;
        }
        self.connect().await
    }

    /// Establish the connection. Called by the entry point at startup and by
    /// the cooldown policy afterwards.
    pub async fn connect(&self) -> Result<(), RemoteError> {
        {
            let mut meta = mutex_lock(&self.meta, SOURCE, "connect");
            if meta.state == ConnState::Connecting {
                return Err(RemoteError::Unavailable);
            }
            meta.state = ConnState::Connecting;
            meta.last_attempt = Some(Instant::now());
        }

        let result = async {
            let client = Client::open(self.url.as_str())
                .map_err(|err| RemoteError::Command(err.to_string()))?;
            let manager_config = ConnectionManagerConfig::new()
                .set_number_of_retries(1)
                .set_connection_timeout(CONNECT_TIMEOUT);
            client
                .get_connection_manager_with_config(manager_config)
                .await
                .map_err(|err| RemoteError::Command(err.to_string()))
        }
        .await;

        match result {
            Ok(manager) => {
                *self.manager.write().await = Some(manager);
                let mut meta = mutex_lock(&self.meta, SOURCE, "connect.ok");
                meta.state = ConnState::Connected;
                meta.attempts = 0;
                info!(target: "verdura::cache", tier = "remote", "Distributed cache tier connected");
                Ok(())
            }
            Err(err) => {
                let mut meta = mutex_lock(&self.meta, SOURCE, "connect.err");
                meta.state = ConnState::Disconnected;
                meta.attempts = meta.attempts.saturating_add(1);
                warn!(
                    target: "verdura::cache",
                    tier = "remote",
                    attempts = meta.attempts,
                    error = %err,
                    "Distributed cache tier connection failed"
                );
                Err(err)
            }
        }
    }

    /// Hand out a connection handle, reconnecting under the cooldown policy
    /// when the tier is down. `None` means the caller should treat the
    /// operation as a miss.
    async fn conn(&self) -> Option<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.as_ref() {
            return Some(manager.clone());
        }

        let should_attempt = {
            let meta = mutex_lock(&self.meta, SOURCE, "conn.policy");
            if meta.state == ConnState::Connecting {
                false
            } else if meta.attempts >= self.max_attempts {
                debug!(
                    target: "verdura::cache",
                    tier = "remote",
                    "Automatic reconnect budget exhausted; waiting for explicit reconnect"
                );
                false
            } else {
                match meta.last_attempt {
                    Some(at) => at.elapsed() >= self.cooldown,
                    None => true,
                }
            }
        };

        if !should_attempt {
            return None;
        }

        if self.connect().await.is_err() {
            return None;
        }
        self.manager.read().await.clone()
    }

    /// Drop the live handle after a command failure so the next call goes
    /// through the reconnect policy.
    async fn mark_disconnected(&self) {
        *self.manager.write().await = None;
        let mut meta = mutex_lock(&self.meta, SOURCE, "mark_disconnected");
        meta.state = ConnState::Disconnected;
        meta.last_attempt = Some(Instant::now());
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut conn = self.conn().await.ok_or(RemoteError::Unavailable)?;
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.mark_disconnected().await;
                Err(RemoteError::Command(err.to_string()))
            }
        }
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
        let mut conn = self.conn().await.ok_or(RemoteError::Unavailable)?;
        let ttl_secs = ttl.as_secs().max(1);
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mark_disconnected().await;
                Err(RemoteError::Command(err.to_string()))
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let mut conn = self.conn().await.ok_or(RemoteError::Unavailable)?;
        match conn.del::<_, ()>(key).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mark_disconnected().await;
                Err(RemoteError::Command(err.to_string()))
            }
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64, RemoteError> {
        let mut conn = self.conn().await.ok_or(RemoteError::Unavailable)?;
        let keys: Vec<String> = match conn.keys(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                self.mark_disconnected().await;
                return Err(RemoteError::Command(err.to_string()));
            }
        };
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;
        match conn.del::<_, ()>(keys).await {
            Ok(()) => Ok(count),
            Err(err) => {
                self.mark_disconnected().await;
                Err(RemoteError::Command(err.to_string()))
            }
        }
    }

    /// Lightweight round-trip probe for the health endpoint; never used on
    /// the request hot path.
    pub async fn ping(&self) -> TierHealth {
        let Some(mut conn) = self.conn().await else {
            return TierHealth::unhealthy("disconnected");
        };
        let started = Instant::now();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                metrics::histogram!("verdura_cache_remote_ping_ms").record(latency_ms as f64);
                TierHealth::healthy(latency_ms)
            }
            Err(err) => {
                self.mark_disconnected().await;
                TierHealth::unhealthy(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_tier(max_attempts: u32) -> RemoteTier {
        let config = CacheConfig {
            max_reconnect_attempts: max_attempts,
            reconnect_cooldown: Duration::ZERO,
            ..CacheConfig::default()
        };
        // Nothing listens on this port; connects fail fast.
        RemoteTier::new("redis://127.0.0.1:1/".to_string(), &config)
    }

    #[tokio::test]
    async fn operations_degrade_when_unreachable() {
        let tier = unreachable_tier(2);
        assert!(matches!(tier.get("k").await, Err(RemoteError::Unavailable)));
        assert_eq!(tier.state(), ConnState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_budget_is_capped() {
        let tier = unreachable_tier(2);
        for _ in 0..4 {
            let _ = tier.get("k").await;
        }
        let attempts = mutex_lock(&tier.meta, SOURCE, "test").attempts;
        assert_eq!(attempts, 2);

        // Explicit reconnect resets the budget and attempts again.
        let _ = tier.reconnect().await;
        let attempts = mutex_lock(&tier.meta, SOURCE, "test").attempts;
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn ping_reports_unhealthy_when_down() {
        let tier = unreachable_tier(1);
        let health = tier.ping().await;
        assert!(!health.healthy);
        assert!(health.error.is_some());
    }
}

//! Core rate limiter: one key store per identification mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LimiterConfig;
use crate::error::{Result, TurnstileError};

use super::backend::LimiterBackend;
use super::clock::{Clock, SystemClock};
use super::decision::Decision;
use super::eviction::EvictionTask;
use super::key::{canonical_ip, normalize_token, KeyMode};
use super::store::KeyStore;

/// The in-memory admission engine.
///
/// Token keys and address keys live in separate stores with their own
/// quotas. Checks neither log nor perform I/O; only the eviction task
/// logs. What to do with a rejection is up to the caller.
pub struct RateLimiter {
    token: Arc<KeyStore>,
    ip: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    eviction_interval: Duration,
    eviction: Mutex<Option<EvictionTask>>,
}

impl RateLimiter {
    /// Create a limiter on the system clock, without background eviction.
    pub fn new(config: &LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on the given clock, without background eviction.
    pub fn with_clock(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            token: Arc::new(KeyStore::with_shards(config.token.quota()?, config.shards)),
            ip: Arc::new(KeyStore::with_shards(config.ip.quota()?, config.shards)),
            clock,
            idle_timeout: config.idle_timeout(),
            eviction_interval: config.eviction_interval(),
            eviction: Mutex::new(None),
        })
    }

    /// Create a limiter and start its eviction task.
    ///
    /// Must be called from within a tokio runtime. The task runs until
    /// [`RateLimiter::shutdown`] is called or the limiter is dropped.
    pub fn start(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let limiter = Self::with_clock(config, clock)?;
        let task = EvictionTask::spawn(
            vec![
                (KeyMode::Token, limiter.token.clone()),
                (KeyMode::Ip, limiter.ip.clone()),
            ],
            limiter.clock.clone(),
            limiter.eviction_interval,
            limiter.idle_timeout,
        );
        *limiter.eviction.lock() = Some(task);
        Ok(limiter)
    }

    /// Check one event for a caller token.
    ///
    /// The token is trimmed; callers must not pass an empty one.
    pub async fn allow_by_token(&self, token: &str) -> Result<Decision> {
        let token = normalize_token(token).ok_or(TurnstileError::EmptyKey("token"))?;
        self.check(KeyMode::Token, token)
    }

    /// Check one event for a client address.
    ///
    /// The address is canonicalized here and nowhere else, so callers may
    /// pass it raw: `[::ffff:10.0.0.1]:80` and `10.0.0.1` share a quota.
    pub async fn allow_by_ip(&self, ip: &str) -> Result<Decision> {
        let ip = canonical_ip(ip);
        if ip.is_empty() {
            return Err(TurnstileError::EmptyKey("ip"));
        }
        self.check(KeyMode::Ip, &ip)
    }

    /// Check one event for an already normalized key.
    pub fn check(&self, mode: KeyMode, key: &str) -> Result<Decision> {
        if key.is_empty() {
            return Err(TurnstileError::EmptyKey(mode.as_str()));
        }
        Ok(self.store(mode).check(key, self.clock.now()))
    }

    /// Run one eviction sweep over both stores immediately.
    ///
    /// Returns the number of evicted keys.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        self.token.evict(self.idle_timeout, now) + self.ip.evict(self.idle_timeout, now)
    }

    /// Number of keys tracked for a mode.
    pub fn key_count(&self, mode: KeyMode) -> usize {
        self.store(mode).len()
    }

    /// Whether a key currently has state.
    pub fn is_tracked(&self, mode: KeyMode, key: &str) -> bool {
        self.store(mode).contains(key)
    }

    /// Whether the background eviction task is running.
    pub fn is_evicting(&self) -> bool {
        self.eviction.lock().is_some()
    }

    /// Stop the eviction task and wait for it to exit.
    ///
    /// Admission checks keep working afterwards; idle keys are simply no
    /// longer swept.
    pub async fn shutdown(&self) {
        let task = self.eviction.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    /// Drop all tracked state.
    pub fn clear(&self) {
        self.token.clear();
        self.ip.clear();
    }

    fn store(&self, mode: KeyMode) -> &KeyStore {
        match mode {
            KeyMode::Token => &self.token,
            KeyMode::Ip => &self.ip,
        }
    }
}

#[async_trait]
impl LimiterBackend for RateLimiter {
    async fn allow_by_token(&self, token: &str) -> Result<Decision> {
        self.allow_by_token(token).await
    }

    async fn allow_by_ip(&self, ip: &str) -> Result<Decision> {
        self.allow_by_ip(ip).await
    }
}

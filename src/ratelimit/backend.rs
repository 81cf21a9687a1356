//! Limiter trait for abstracting the engine behind the admission layer.

use async_trait::async_trait;

use super::decision::Decision;
use crate::error::Result;

/// Trait for admission engine implementations.
///
/// The in-memory [`RateLimiter`](super::RateLimiter) never fails in steady
/// state. The error path exists for engines whose state lives in an external
/// store; callers decide whether such a failure admits or refuses the request.
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Check one event against the token quota.
    async fn allow_by_token(&self, token: &str) -> Result<Decision>;

    /// Check one event against the address quota.
    async fn allow_by_ip(&self, ip: &str) -> Result<Decision>;
}

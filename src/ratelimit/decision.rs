//! Outcome of a single admission check.

use std::time::Duration;

/// The result of checking one event against a key's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the event was admitted
    pub allowed: bool,
    /// Minimum wait before a retry can succeed; zero when allowed
    pub retry_after: Duration,
    /// The quota's maximum events per window
    pub limit: u64,
    /// Whole events still available after this check
    pub remaining: u64,
}

impl Decision {
    pub(crate) fn allow(limit: u64, remaining: u64) -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
            limit,
            remaining,
        }
    }

    pub(crate) fn deny(limit: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
            limit,
            remaining: 0,
        }
    }

    /// Retry delay rounded up to whole seconds, never below one.
    ///
    /// This is the value reported in a `Retry-After` header. Allowed
    /// decisions report zero.
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            return 0;
        }
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}

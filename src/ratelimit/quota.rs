//! Quota definition: how many events a key may spend per window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// Counting algorithm applied to every key under a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuous refill at `max_events / window`, bursting up to `max_events`.
    TokenBucket,
    /// Exact log of admissions over the trailing window.
    #[default]
    SlidingWindow,
    /// Counter reset when a window that opened at the first event expires.
    ///
    /// Admits up to twice the quota across a window boundary.
    FixedWindow,
}

/// An immutable per-mode quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max_events: u64,
    window: Duration,
    algorithm: Algorithm,
}

impl Quota {
    /// Create a quota, rejecting values that could never admit anything.
    pub fn new(max_events: u64, window: Duration, algorithm: Algorithm) -> Result<Self> {
        if max_events == 0 {
            return Err(TurnstileError::Config(
                "quota max_events must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::Config(
                "quota window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_events,
            window,
            algorithm,
        })
    }

    /// Maximum events admitted per window.
    pub fn max_events(&self) -> u64 {
        self.max_events
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counting algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Token bucket refill rate in events per second.
    pub(crate) fn refill_rate(&self) -> f64 {
        self.max_events as f64 / self.window.as_secs_f64()
    }
}

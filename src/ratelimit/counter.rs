//! Per-key counter state and the admission algorithms.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::decision::Decision;
use super::quota::{Algorithm, Quota};

/// Slack for float drift when a bucket refills to exactly one token.
const TOKEN_EPSILON: f64 = 1e-9;

/// Counters for one key under one quota.
///
/// A state is only ever touched through the store entry that owns it, so
/// none of the methods here need their own synchronization.
#[derive(Debug)]
pub struct KeyState {
    counter: Counter,
    last_access: Instant,
}

#[derive(Debug)]
enum Counter {
    TokenBucket {
        tokens: f64,
        last_refill: Instant,
    },
    SlidingWindow {
        /// Admission instants inside the trailing window, oldest first
        admitted: VecDeque<Instant>,
    },
    FixedWindow {
        window_start: Option<Instant>,
        count: u64,
    },
}

impl KeyState {
    /// Create a state at full capacity.
    pub fn new(quota: &Quota, now: Instant) -> Self {
        let counter = match quota.algorithm() {
            Algorithm::TokenBucket => Counter::TokenBucket {
                tokens: quota.max_events() as f64,
                last_refill: now,
            },
            Algorithm::SlidingWindow => Counter::SlidingWindow {
                admitted: VecDeque::new(),
            },
            Algorithm::FixedWindow => Counter::FixedWindow {
                window_start: None,
                count: 0,
            },
        };
        Self {
            counter,
            last_access: now,
        }
    }

    /// Try to admit one event at `now`.
    ///
    /// An instant earlier than one already observed is treated as no time
    /// having passed, so a clock step backwards never frees capacity.
    pub fn try_admit(&mut self, quota: &Quota, now: Instant) -> Decision {
        let now = now.max(self.last_access);
        self.last_access = now;

        let limit = quota.max_events();
        match &mut self.counter {
            Counter::TokenBucket {
                tokens,
                last_refill,
            } => {
                let rate = quota.refill_rate();
                let elapsed = now.saturating_duration_since(*last_refill).as_secs_f64();
                *tokens = (*tokens + elapsed * rate).min(limit as f64);
                *last_refill = now;

                if *tokens + TOKEN_EPSILON >= 1.0 {
                    *tokens = (*tokens - 1.0).max(0.0);
                    Decision::allow(limit, tokens.floor() as u64)
                } else {
                    let wait = (1.0 - *tokens) / rate;
                    Decision::deny(limit, ceil_duration(wait))
                }
            }
            Counter::SlidingWindow { admitted } => {
                let window = quota.window();
                while admitted.front().is_some_and(|t| *t + window <= now) {
                    admitted.pop_front();
                }

                if (admitted.len() as u64) < limit {
                    admitted.push_back(now);
                    Decision::allow(limit, limit - admitted.len() as u64)
                } else {
                    // Non-empty: limit is at least one.
                    let oldest = admitted[0];
                    Decision::deny(limit, (oldest + window).saturating_duration_since(now))
                }
            }
            Counter::FixedWindow {
                window_start,
                count,
            } => {
                let window = quota.window();
                let start = match window_start.filter(|start| *start + window > now) {
                    Some(start) => start,
                    None => {
                        *count = 0;
                        *window_start = Some(now);
                        now
                    }
                };

                if *count < limit {
                    *count += 1;
                    Decision::allow(limit, limit - *count)
                } else {
                    Decision::deny(limit, (start + window).saturating_duration_since(now))
                }
            }
        }
    }

    /// The last instant this state was checked.
    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Whether the state has gone unused for longer than `threshold`.
    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_access) > threshold
    }
}

/// Convert fractional seconds to a duration, rounding up to the next nanosecond.
fn ceil_duration(secs: f64) -> Duration {
    let nanos = (secs * 1e9).ceil();
    if nanos <= 1.0 {
        Duration::from_nanos(1)
    } else if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

//! Sharded in-memory storage of per-key state.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::counter::KeyState;
use super::decision::Decision;
use super::quota::Quota;

/// Default number of shards when none is configured.
pub const DEFAULT_SHARDS: usize = 64;

/// Concurrent map from key to [`KeyState`] under a single quota.
///
/// Keys are spread over independently locked shards by hash. A handle
/// returned by [`KeyStore::get_or_create`] holds its shard's write lock, and
/// eviction takes the same lock, so a state can never be evicted while a
/// caller is updating it.
#[derive(Debug)]
pub struct KeyStore {
    states: DashMap<String, KeyState>,
    quota: Quota,
}

impl KeyStore {
    /// Create a store with the default shard count.
    pub fn new(quota: Quota) -> Self {
        Self::with_shards(quota, DEFAULT_SHARDS)
    }

    /// Create a store with roughly `shards` shards.
    ///
    /// The count is rounded up to a power of two, with a minimum of two.
    pub fn with_shards(quota: Quota, shards: usize) -> Self {
        let shards = shards.max(2).next_power_of_two();
        Self {
            states: DashMap::with_shard_amount(shards),
            quota,
        }
    }

    /// The quota applied to every key in this store.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Get exclusive access to a key's state, creating it at full capacity
    /// if the key has not been seen.
    ///
    /// Concurrent first access by several callers yields a single state.
    pub fn get_or_create(&self, key: &str, now: Instant) -> RefMut<'_, String, KeyState> {
        if let Some(state) = self.states.get_mut(key) {
            return state;
        }
        self.states
            .entry(key.to_owned())
            .or_insert_with(|| KeyState::new(&self.quota, now))
    }

    /// Admit or reject one event for `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> Decision {
        let mut state = self.get_or_create(key, now);
        state.try_admit(&self.quota, now)
    }

    /// Remove every state idle for longer than `idle_threshold`.
    ///
    /// Returns the number of removed entries.
    pub fn evict(&self, idle_threshold: Duration, now: Instant) -> usize {
        let mut evicted = 0;
        self.states.retain(|_, state| {
            let keep = !state.is_idle(now, idle_threshold);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Whether a state currently exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.states.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop all state.
    pub fn clear(&self) {
        self.states.clear();
    }
}

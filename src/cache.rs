//! Expiring key/value cache with a background sweeper.
//!
//! Every read checks expiry itself, so an expired entry is invisible even
//! before the sweeper removes it. The sweeper only bounds memory held by keys
//! nobody asks for again.
//!
//! Invariants:
//! - An entry set at `t0` is returned by `get` for every `now < t0 + ttl` and
//!   never for `now >= t0 + ttl`.
//! - `set` always overwrites and restarts the entry's TTL.
//! - `clear` drops all entries under a single write lock.

use crate::clock::{Clock, MonotonicClock};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: u64,
}

/// Key/value store with a per-entry absolute expiry.
///
/// Values are cloned out on read; store `Arc`-backed values to keep that cheap.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    items: RwLock<HashMap<String, Entry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, MonotonicClock::default())
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(ttl: Duration, clock: C) -> Self {
        Self { items: RwLock::new(HashMap::new()), ttl, clock: Arc::new(clock) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, expiring `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let ttl_millis = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = self.clock.now_millis().saturating_add(ttl_millis);
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.into(), Entry { value, expires_at });
    }

    /// Live value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        match items.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub fn delete(&self, key: &str) {
        self.items.write().unwrap_or_else(PoisonError::into_inner).remove(key);
    }

    /// Remove every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let held = items.len();
        items.clear();
        held
    }

    /// Physically remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let before = items.len();
        items.retain(|_, entry| now < entry.expires_at);
        before - items.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the background sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped;
    /// dropping the returned handle stops it immediately.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else { break };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(target: "quotascope::cache", removed, "swept expired cache entries");
                }
            }
        });
        SweeperHandle { task }
    }
}

/// Owns the sweeper task; aborts it on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

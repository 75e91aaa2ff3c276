//! Process-local, bounded fast path for dedup.
//!
//! Entries are evicted in insertion order (FIFO). Looking a key up does not
//! extend its life: the bound exists to cap memory, not to maximize hits.
//! The cache is advisory; it can say "this process already handled it" but
//! never grants a claim on its own while the durable store is reachable.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::model::IncidentKey;
use crate::telemetry::metrics;

/// Default number of keys held by a [`LocalCache`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded FIFO set of incident keys this process has handled.
///
/// Safe to share between tasks of one process (`Arc<LocalCache>`); the lock
/// is held only for O(1) map operations and never across an await point.
#[derive(Debug)]
pub struct LocalCache {
    state: Mutex<CacheState>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<IncidentKey, DateTime<Utc>>,
    /// Insertion order, front = oldest.
    order: VecDeque<IncidentKey>,
}

impl LocalCache {
    /// Create a cache holding at most `capacity` keys (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), stamping entries from `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(4096)),
                order: VecDeque::with_capacity(capacity.min(4096)),
            }),
            capacity,
            clock,
        }
    }

    /// Has this process already handled `key`?
    pub fn seen(&self, key: &IncidentKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Record `key` as handled. Re-marking keeps the original position.
    pub fn mark(&self, key: &IncidentKey) {
        self.mark_if_absent(key);
    }

    /// Atomically check and record `key`.
    ///
    /// Returns `true` if the key was not present and has now been recorded,
    /// `false` if it was already there.
    pub fn mark_if_absent(&self, key: &IncidentKey) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.entries.contains_key(key) {
            return false;
        }
        state.entries.insert(key.clone(), now);
        state.order.push_back(key.clone());

        let mut evicted = 0u64;
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            evicted += 1;
        }
        drop(state);

        if evicted > 0 {
            tracing::debug!(evicted, capacity = self.capacity, "local cache evicted");
            metrics::cache_evictions().add(evicted, &[]);
        }
        true
    }

    /// When this process recorded `key`, if it still holds it.
    pub fn claimed_at(&self, key: &IncidentKey) -> Option<DateTime<Utc>> {
        self.lock().entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave the map and the queue
        // disagreeing in a way that matters for an advisory cache.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

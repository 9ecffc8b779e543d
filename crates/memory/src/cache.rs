use crate::metrics::{Metrics, MetricsSnapshot};
use crate::value::{Lease, Slot, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// External memory-pressure signal, mapped to how much of the budget to
/// keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimLevel {
    /// Trim to half of the budget.
    Moderate,
    /// Trim to a quarter of the budget.
    Critical,
    /// Evict every entry that isn't referenced.
    Complete,
}

impl TrimLevel {
    fn target(&self, max_size: u64) -> u64 {
        match self {
            TrimLevel::Moderate => max_size / 2,
            TrimLevel::Critical => max_size / 4,
            TrimLevel::Complete => 0,
        }
    }
}

struct Entry {
    key: Arc<str>,
    slot: Arc<Slot>,
    tick: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<Arc<str>, Entry>,
    /// Recency order: lowest tick is least recently used.
    recency: BTreeMap<u64, Arc<str>>,
    size: u64,
    tick: u64,
}

impl State {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, entry.key.clone());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.size = self.size.saturating_sub(entry.slot.value.size());
        Some(entry)
    }
}

/// Bounded LRU cache of decoded images. See the [crate docs](crate).
///
/// All operations take a single internal lock for the duration of the map
/// update; callers never lock anything themselves.
pub struct MemoryCache {
    max_size: u64,
    state: Mutex<State>,
    metrics: Metrics,
    outstanding: Arc<AtomicUsize>,
}

impl MemoryCache {
    pub fn new(max_size: u64) -> Self {
        Self { max_size, state: Mutex::new(State::default()), metrics: Metrics::default(), outstanding: Arc::default() }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Total size of all entries, referenced or not.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in recency order, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().recency.values().map(|k| k.to_string()).collect()
    }

    /// Whether a valid entry exists for `key`. Does not count as an access.
    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().entries.get(key).is_some_and(|e| e.slot.value.check_valid())
    }

    /// Number of cached entries currently pinned by at least one lease.
    pub fn referenced_len(&self) -> usize {
        self.state.lock().entries.values().filter(|e| e.slot.is_referenced()).count()
    }

    /// Number of leases handed out and not yet released, including leases on
    /// entries that have since been removed from the cache.
    pub fn active_leases(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Look up a valid entry and mark it most recently used.
    ///
    /// An entry whose image fails `check_valid()` is removed and reported as
    /// a miss.
    pub fn get(&self, key: &str) -> Option<Lease> {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(key) else {
            Metrics::incr(&self.metrics.misses);
            return None;
        };
        if !entry.slot.value.check_valid() {
            state.remove(key);
            Metrics::incr(&self.metrics.invalidations);
            Metrics::incr(&self.metrics.misses);
            tracing::warn!(key, "dropping memory cache entry with invalid image");
            return None;
        }
        let lease = Lease::acquire(entry.key.clone(), entry.slot.clone(), self.outstanding.clone());
        state.touch(key);
        Metrics::incr(&self.metrics.hits);
        Some(lease)
    }

    /// Insert or replace an entry, then evict unreferenced entries until the
    /// cache fits its budget again.
    ///
    /// Returns a lease on the stored entry, or `None` if the value alone is
    /// larger than the whole budget (in which case nothing changes).
    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Lease> {
        let key: Arc<str> = key.into().into();
        if value.size() > self.max_size {
            Metrics::incr(&self.metrics.rejected);
            tracing::debug!(key = %key, size = value.size(), max_size = self.max_size, "value exceeds memory cache budget");
            return None;
        }
        let mut state = self.state.lock();
        state.remove(&key);
        let slot = Slot::new(value);
        // Taken before eviction so the new entry is never its own victim.
        let lease = Lease::acquire(key.clone(), slot.clone(), self.outstanding.clone());
        let tick = state.next_tick();
        state.size += slot.value.size();
        state.recency.insert(tick, key.clone());
        state.entries.insert(key.clone(), Entry { key, slot, tick });
        Metrics::incr(&self.metrics.inserts);
        self.trim_locked(&mut state, self.max_size);
        Some(lease)
    }

    /// Remove an entry regardless of whether it is referenced. Outstanding
    /// leases stay usable; they just no longer pin anything in the cache.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.lock().remove(key).map(|entry| entry.slot.value.clone())
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.recency.clear();
        state.size = 0;
        tracing::debug!(count, "cleared memory cache");
    }

    /// Evict unreferenced entries in response to memory pressure.
    pub fn trim(&self, level: TrimLevel) {
        let mut state = self.state.lock();
        let before = state.size;
        self.trim_locked(&mut state, level.target(self.max_size));
        tracing::debug!(?level, before, after = state.size, "trimmed memory cache");
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        self.metrics.snapshot(state.size, self.max_size, state.entries.len())
    }

    fn trim_locked(&self, state: &mut State, target: u64) {
        if state.size <= target {
            return;
        }
        let mut excess = state.size - target;
        let victims: Vec<Arc<str>> = state
            .recency
            .values()
            .filter_map(|key| state.entries.get(key))
            .filter(|entry| !entry.slot.is_referenced())
            .take_while(|entry| {
                let keep_going = excess > 0;
                excess = excess.saturating_sub(entry.slot.value.size());
                keep_going
            })
            .map(|entry| entry.key.clone())
            .collect();
        for key in victims {
            if let Some(entry) = state.remove(&key) {
                Metrics::incr(&self.metrics.evictions);
                tracing::debug!(key = %key, size = entry.slot.value.size(), "evicted memory cache entry");
            }
        }
        if state.size > target {
            tracing::debug!(size = state.size, target, "memory cache over budget; remaining entries are referenced");
        }
    }
}

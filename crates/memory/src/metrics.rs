use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by every cache operation.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) inserts: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) invalidations: AtomicU64,
}

impl Metrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: u64, max_size: u64, len: usize) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        MetricsSnapshot {
            hits,
            misses,
            hit_ratio: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
            inserts: self.inserts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            size,
            max_size,
            len,
        }
    }
}

/// Point-in-time view of a [`MemoryCache`](crate::MemoryCache)'s counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub inserts: u64,
    /// Values refused because they were larger than the whole budget.
    pub rejected: u64,
    pub evictions: u64,
    /// Entries dropped because their image failed `check_valid()`.
    pub invalidations: u64,
    pub size: u64,
    pub max_size: u64,
    pub len: usize,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {}/{} bytes, {} hits / {} misses ({:.1}%), {} evicted, {} invalidated",
            self.len,
            self.size,
            self.max_size,
            self.hits,
            self.misses,
            self.hit_ratio * 100.0,
            self.evictions,
            self.invalidations,
        )
    }
}

//! In-memory LRU cache of decoded images.
//!
//! [`MemoryCache`] maps a cache key to a [`Value`] (an image handle plus its
//! byte size and extras) and keeps the total size under a configured budget
//! by evicting the least recently used entries.
//!
//! Entries handed out by the cache are wrapped in a [`Lease`]. While any
//! lease for an entry is alive the entry is *referenced* and will never be
//! evicted, so an image cannot disappear from the cache (and be recycled by
//! its owner) while it is on screen. When every entry is referenced the cache
//! is allowed to exceed its budget until leases are released; the budget is a
//! soft limit.
//!
//! Entries whose image reports `check_valid() == false` are treated as absent
//! and dropped on lookup.

mod cache;
mod metrics;
mod value;

pub use crate::cache::{MemoryCache, TrimLevel};
pub use crate::metrics::MetricsSnapshot;
pub use crate::value::{Lease, Value};

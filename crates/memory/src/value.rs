use sketch_image::Image;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A cached image plus bookkeeping.
#[derive(Clone)]
pub struct Value {
    image: Arc<dyn Image>,
    size: u64,
    extras: HashMap<String, String>,
}

impl Value {
    /// Wrap an image, using its [`byte_count`](Image::byte_count) as the size
    /// estimate.
    pub fn new(image: Arc<dyn Image>) -> Self {
        let size = image.byte_count();
        Self { image, size, extras: HashMap::new() }
    }

    #[must_use]
    pub fn with_extras(mut self, extras: HashMap<String, String>) -> Self {
        self.extras = extras;
        self
    }

    pub fn image(&self) -> &Arc<dyn Image> {
        &self.image
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn extras(&self) -> &HashMap<String, String> {
        &self.extras
    }

    pub fn check_valid(&self) -> bool {
        self.image.check_valid()
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Value").field("image", &self.image).field("size", &self.size).finish_non_exhaustive()
    }
}

/// Shared between the cache map and every lease on the entry.
pub(crate) struct Slot {
    pub(crate) value: Value,
    refs: AtomicUsize,
}

impl Slot {
    pub(crate) fn new(value: Value) -> Arc<Self> {
        Arc::new(Self { value, refs: AtomicUsize::new(0) })
    }

    pub(crate) fn is_referenced(&self) -> bool {
        self.refs.load(Ordering::Acquire) > 0
    }
}

/// A counted reference to a cache entry.
///
/// Acquiring a lease (from [`MemoryCache::get`](crate::MemoryCache::get),
/// [`MemoryCache::put`](crate::MemoryCache::put) or by cloning another lease)
/// pins the entry against eviction; [`release`](Self::release) (or dropping
/// the lease) unpins it. Every acquire is therefore paired with exactly one
/// release, which the cache exposes for leak checks through
/// [`MemoryCache::active_leases`](crate::MemoryCache::active_leases).
pub struct Lease {
    key: Arc<str>,
    slot: Arc<Slot>,
    outstanding: Arc<AtomicUsize>,
}

impl Lease {
    pub(crate) fn acquire(key: Arc<str>, slot: Arc<Slot>, outstanding: Arc<AtomicUsize>) -> Self {
        slot.refs.fetch_add(1, Ordering::AcqRel);
        outstanding.fetch_add(1, Ordering::AcqRel);
        Self { key, slot, outstanding }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.slot.value
    }

    pub fn image(&self) -> &Arc<dyn Image> {
        self.slot.value.image()
    }

    /// Give the reference back to the cache.
    pub fn release(self) {}
}

impl Clone for Lease {
    fn clone(&self) -> Self {
        Self::acquire(self.key.clone(), self.slot.clone(), self.outstanding.clone())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.slot.refs.fetch_sub(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Debug for Lease {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("refs", &self.slot.refs.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

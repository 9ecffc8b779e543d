//! Persistent disk cache with atomic edits.
//!
//! [`DiskCache`] is a journaled, content-addressed blob store with LRU
//! eviction by total size:
//!
//! - **Reads** go through a [`Snapshot`], a read-only handle opened at lookup
//!   time.
//! - **Writes** go through an [`Editor`] (at most one per key), which writes
//!   to a temporary file and publishes it by atomic rename. Aborting (or
//!   dropping) an editor leaves no trace.
//! - **Coordination** between independent callers that might both want to
//!   populate the same key uses [`DiskCache::with_lock`].
//!
//! The cache is versioned: opening a directory whose journal was written with
//! a different version discards everything in it. A directory that cannot be
//! used degrades the cache to a no-op instead of failing.

mod cache;
mod editor;
pub mod error;
mod journal;
mod lock;
mod snapshot;

pub use crate::cache::DiskCache;
pub use crate::editor::Editor;
pub use crate::lock::KeyGuard;
pub use crate::snapshot::Snapshot;

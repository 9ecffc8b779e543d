use crate::fetch::DataFrom;
use derive_more::Display;

/// Per-tier cache behaviour for a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    #[default]
    Enabled,
    ReadOnly,
    WriteOnly,
    Disabled,
}

impl CachePolicy {
    pub fn read_enabled(&self) -> bool {
        matches!(self, CachePolicy::Enabled | CachePolicy::ReadOnly)
    }

    pub fn write_enabled(&self) -> bool {
        matches!(self, CachePolicy::Enabled | CachePolicy::WriteOnly)
    }

    pub fn is_enabled(&self) -> bool {
        *self != CachePolicy::Disabled
    }
}

/// The furthest source tier a request may load from. Variants are ordered
/// from nearest to furthest.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Depth {
    /// Memory cache only.
    Memory,
    /// Memory, disk caches, local files and in-memory sources.
    Local,
    #[default]
    Network,
}

impl Depth {
    pub fn allows(&self, from: DataFrom) -> bool {
        from.depth() <= *self
    }
}

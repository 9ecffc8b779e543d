use crate::ImageFormat;
use std::any::Any;
use std::fmt::Debug;

/// A decoded (or decodable) image artifact.
///
/// Caches only ever look at [`byte_count`](Self::byte_count) and
/// [`check_valid`](Self::check_valid); pixel storage is opaque to them.
/// Implementations must be cheap to share behind an `Arc`.
pub trait Image: Debug + Send + Sync + 'static {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Estimated memory footprint, used for cache budgeting.
    fn byte_count(&self) -> u64;

    /// Whether the backing storage is still usable. An image whose storage
    /// was recycled or mutated externally returns `false`, and caches will
    /// treat it as absent rather than hand it out.
    fn check_valid(&self) -> bool {
        true
    }

    /// Downcasting hook for transformations that only understand one
    /// concrete artifact.
    fn as_any(&self) -> &dyn Any;
}

/// Intrinsic properties of the source image, independent of how it was
/// decoded (sampled size, pixel config).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self { width, height, format }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

//! Image primitives with automatic format detection.
//!
//! This crate holds the narrow contracts the rest of the pipeline needs from
//! an image, without ever inspecting pixels itself:
//!
//! - **The [`Image`] trait**: byte size, dimensions and a validity check
//!   that lets caches drop entries whose backing storage was recycled.
//! - **Concrete artifacts**: [`Bitmap`] (decoded pixels) and
//!   [`EncodedImage`] (compressed bytes handed to a platform decoder later).
//! - **Format detection** from magic bytes ([`ImageFormat::from_magic_bytes`]),
//!   file extensions ([`ImageFormat::from_path`]) or MIME types
//!   ([`ImageFormat::from_mime_type`]).
//! - **Header parsing** of image dimensions ([`ImageFormat::dimensions`]).
//! - **Peek-decide-stream** via [`PeekableReader`]: read just enough of a
//!   source to sniff it, then stream the rest or discard.

mod bitmap;
mod construct;
mod dimensions;
mod encoded;
pub mod error;
mod image;
mod peekable;
mod util;

pub use crate::bitmap::{Bitmap, BitmapConfig, ColorSpace};
pub use crate::encoded::EncodedImage;
pub use crate::image::{Image, ImageInfo};
pub use crate::peekable::PeekableReader;

/// How many leading bytes are needed to sniff any supported format.
///
/// Binary formats only need the first dozen bytes; SVG documents may carry
/// an XML prolog and comments before the root element.
pub const SNIFF_LEN: usize = 1024;

/// A recognised image container format.
///
/// Defaults to [`Unknown`](Self::Unknown), which is also what detection
/// returns when no signature matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Unrecognised content
    #[default]
    Unknown,
    /// JPEG/JFIF (.jpg)
    Jpeg,
    /// Portable Network Graphics (.png)
    Png,
    /// Graphics Interchange Format (.gif)
    Gif,
    /// WebP, lossy or lossless (.webp)
    WebP,
    /// Windows bitmap (.bmp)
    Bmp,
    /// HEIF/HEIC (.heic)
    Heif,
    /// AV1 Image File Format (.avif)
    Avif,
    /// Scalable Vector Graphics (.svg)
    Svg,
}

#[cfg(test)]
mod tests {
    use crate::ImageFormat;

    #[test]
    fn image_format_default() {
        assert_eq!(ImageFormat::default(), ImageFormat::Unknown);
    }
}

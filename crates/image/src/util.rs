use crate::ImageFormat;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for ImageFormat {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl ImageFormat {
    /// Returns the canonical file extension for this format.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Unknown => "",
            ImageFormat::Jpeg => ".jpg",
            ImageFormat::Png => ".png",
            ImageFormat::Gif => ".gif",
            ImageFormat::WebP => ".webp",
            ImageFormat::Bmp => ".bmp",
            ImageFormat::Heif => ".heic",
            ImageFormat::Avif => ".avif",
            ImageFormat::Svg => ".svg",
        }
    }

    /// Returns the short name (for displaying to user and building keys).
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Unknown => "unknown",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Heif => "heif",
            ImageFormat::Avif => "avif",
            ImageFormat::Svg => "svg",
        }
    }

    /// Returns the registered MIME type, or `application/octet-stream` for
    /// unrecognised content.
    #[inline]
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Unknown => "application/octet-stream",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Heif => "image/heif",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    /// Verify that `bytes` start with the expected signature for this format.
    ///
    /// Useful for cross-checking a format declared by a transport (MIME type,
    /// file extension) against the actual content.
    #[must_use]
    pub fn check_magic_bytes(&self, bytes: &[u8]) -> bool {
        Self::from_magic_bytes(bytes) == *self
    }
}

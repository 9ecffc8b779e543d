use crate::error::{ErrorKind, Result};
use crate::{Image, ImageFormat, ImageInfo};
use std::any::Any;

/// Compressed image bytes plus the dimensions parsed from their header.
///
/// This is the artifact produced for formats without an in-crate pixel
/// decoder: the bytes are handed to the platform's codec at draw time, while
/// the pipeline can still cache, budget and key them like any other image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    info: ImageInfo,
    data: Vec<u8>,
}

impl EncodedImage {
    /// Wrap encoded bytes, parsing their dimensions from the header.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidData`] if the header cannot be parsed for
    /// the given format.
    pub fn new(format: ImageFormat, data: Vec<u8>) -> Result<Self> {
        let Some((width, height)) = format.dimensions(&data) else {
            exn::bail!(ErrorKind::InvalidData);
        };
        Ok(Self { info: ImageInfo::new(width, height, format), data })
    }

    pub fn info(&self) -> ImageInfo {
        self.info
    }

    pub fn format(&self) -> ImageFormat {
        self.info.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Image for EncodedImage {
    fn width(&self) -> u32 {
        self.info.width
    }

    fn height(&self) -> u32 {
        self.info.height
    }

    fn byte_count(&self) -> u64 {
        self.data.len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_image_from_gif() {
        let data = b"GIF89a\x02\x00\x03\x00\x00\x00\x00;".to_vec();
        let image = EncodedImage::new(ImageFormat::Gif, data.clone()).unwrap();
        assert_eq!((image.width(), image.height()), (2, 3));
        assert_eq!(image.byte_count(), data.len() as u64);
        assert_eq!(image.info().mime_type(), "image/gif");
        assert!(image.check_valid());
        assert_eq!(image.into_data(), data);
    }

    #[test]
    fn test_encoded_image_rejects_bad_header() {
        let err = EncodedImage::new(ImageFormat::Png, b"not a png".to_vec()).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}

//! Post-decode transformations.

use sketch_image::error::Result;
use sketch_image::{Bitmap, Image};
use std::fmt::Debug;
use std::sync::Arc;

/// A pixel transformation applied after decoding.
///
/// [`key`](Self::key) takes part in the cache key, so it must identify the
/// output exactly: two transformations with the same key must produce the
/// same pixels.
pub trait Transformation: Debug + Send + Sync {
    fn key(&self) -> String;

    /// The transformed image, or `None` if this transformation doesn't apply
    /// to `image` (which is then passed on unchanged).
    fn transform(&self, image: &Arc<dyn Image>) -> Result<Option<Arc<dyn Image>>>;
}

/// Rotates a [`Bitmap`] clockwise by a multiple of 90 degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotateTransformation {
    degrees: u32,
}

impl RotateTransformation {
    /// `None` unless `degrees` is a multiple of 90. Negative values rotate
    /// counter-clockwise.
    pub fn new(degrees: i32) -> Option<Self> {
        (degrees % 90 == 0).then(|| Self { degrees: degrees.rem_euclid(360) as u32 })
    }

    pub fn degrees(&self) -> u32 {
        self.degrees
    }

    fn rotate(&self, bitmap: &Bitmap) -> Result<Bitmap> {
        let (width, height) = (bitmap.width(), bitmap.height());
        let bpp = bitmap.config().bytes_per_pixel();
        let (out_width, out_height) = if self.degrees == 180 { (width, height) } else { (height, width) };
        let mut pixels = vec![0; bitmap.pixels().len()];
        for (index, pixel) in bitmap.pixels().chunks_exact(bpp).enumerate() {
            let x = index as u32 % width;
            let y = index as u32 / width;
            let (to_x, to_y) = match self.degrees {
                90 => (height - 1 - y, x),
                180 => (width - 1 - x, height - 1 - y),
                _ => (y, width - 1 - x),
            };
            let at = (to_y as usize * out_width as usize + to_x as usize) * bpp;
            pixels[at..at + bpp].copy_from_slice(pixel);
        }
        Ok(Bitmap::new(out_width, out_height, bitmap.config(), pixels)?.with_color_space(bitmap.color_space()))
    }
}

impl Transformation for RotateTransformation {
    fn key(&self) -> String {
        format!("Rotate({})", self.degrees)
    }

    fn transform(&self, image: &Arc<dyn Image>) -> Result<Option<Arc<dyn Image>>> {
        if self.degrees == 0 {
            return Ok(None);
        }
        let Some(bitmap) = image.as_any().downcast_ref::<Bitmap>() else {
            return Ok(None);
        };
        Ok(Some(Arc::new(self.rotate(bitmap)?)))
    }
}

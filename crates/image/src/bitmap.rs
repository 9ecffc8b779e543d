//! Decoded pixel buffers.
//!
//! A [`Bitmap`] owns tightly packed rows of pixels in one of the supported
//! [`BitmapConfig`]s. Recycling is tracked with an owner flag rather than by
//! freeing memory, so anything still holding the bitmap (a cache entry, a
//! lease) observes it through [`Image::check_valid`] instead of crashing.

use crate::Image;
use crate::error::{ErrorKind, Result};
use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};

const CACHE_MAGIC: [u8; 4] = *b"SKBM";
const CACHE_VERSION: u8 = 1;
const CACHE_HEADER_LEN: usize = 16;

/// Pixel storage layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BitmapConfig {
    /// 8 bits per channel, RGBA order.
    #[default]
    Rgba8888,
    /// 16-bit little-endian RGB with 5/6/5 bit channels, no alpha.
    Rgb565,
}

impl BitmapConfig {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            BitmapConfig::Rgba8888 => 4,
            BitmapConfig::Rgb565 => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BitmapConfig::Rgba8888 => "RGBA_8888",
            BitmapConfig::Rgb565 => "RGB_565",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            BitmapConfig::Rgba8888 => 1,
            BitmapConfig::Rgb565 => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BitmapConfig::Rgba8888),
            2 => Some(BitmapConfig::Rgb565),
            _ => None,
        }
    }
}

/// Colour space the pixel values are expressed in. Only carried as a tag;
/// no conversion happens in this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    DisplayP3,
}

impl ColorSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorSpace::Srgb => "SRGB",
            ColorSpace::DisplayP3 => "DISPLAY_P3",
        }
    }

    fn tag(space: Option<Self>) -> u8 {
        match space {
            None => 0,
            Some(ColorSpace::Srgb) => 1,
            Some(ColorSpace::DisplayP3) => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Option<Self>> {
        match tag {
            0 => Some(None),
            1 => Some(Some(ColorSpace::Srgb)),
            2 => Some(Some(ColorSpace::DisplayP3)),
            _ => None,
        }
    }
}

pub struct Bitmap {
    width: u32,
    height: u32,
    config: BitmapConfig,
    color_space: Option<ColorSpace>,
    pixels: Vec<u8>,
    recycled: AtomicBool,
}

impl Bitmap {
    /// Wrap an already laid out pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BufferSize`] if `pixels` is not exactly
    /// `width * height * bytes_per_pixel` long.
    pub fn new(width: u32, height: u32, config: BitmapConfig, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * config.bytes_per_pixel();
        if pixels.len() != expected {
            exn::bail!(ErrorKind::BufferSize { expected, actual: pixels.len() });
        }
        Ok(Self { width, height, config, color_space: None, pixels, recycled: AtomicBool::new(false) })
    }

    /// Build a bitmap from RGBA8888 pixels, converting into `config`.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>, config: BitmapConfig) -> Result<Self> {
        match config {
            BitmapConfig::Rgba8888 => Self::new(width, height, config, rgba),
            BitmapConfig::Rgb565 => {
                let expected = width as usize * height as usize * 4;
                if rgba.len() != expected {
                    exn::bail!(ErrorKind::BufferSize { expected, actual: rgba.len() });
                }
                let packed = rgba.chunks_exact(4).flat_map(|px| rgb565(px[0], px[1], px[2]).to_le_bytes()).collect();
                Self::new(width, height, config, packed)
            },
        }
    }

    #[must_use]
    pub fn with_color_space(mut self, color_space: Option<ColorSpace>) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn config(&self) -> BitmapConfig {
        self.config
    }

    pub fn color_space(&self) -> Option<ColorSpace> {
        self.color_space
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The raw bytes of the pixel at `(x, y)`, or `None` if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.config.bytes_per_pixel();
        let at = (y as usize * self.width as usize + x as usize) * bpp;
        self.pixels.get(at..at + bpp)
    }

    /// Mark the pixel storage as released by its owner. Every holder will see
    /// [`check_valid`](Image::check_valid) return `false` from now on.
    pub fn recycle(&self) {
        self.recycled.store(true, Ordering::Release);
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    /// Serialize into the compact blob format used by the result cache.
    pub fn to_cache_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CACHE_HEADER_LEN + self.pixels.len());
        out.extend_from_slice(&CACHE_MAGIC);
        out.extend_from_slice(&[CACHE_VERSION, self.config.tag(), ColorSpace::tag(self.color_space), 0]);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.pixels);
        out
    }

    /// Parse a blob written by [`to_cache_bytes`](Self::to_cache_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidData`] for anything that isn't a complete
    /// blob of the current version.
    pub fn from_cache_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(header) = bytes.get(..CACHE_HEADER_LEN) else {
            exn::bail!(ErrorKind::InvalidData);
        };
        if header[..4] != CACHE_MAGIC || header[4] != CACHE_VERSION {
            exn::bail!(ErrorKind::InvalidData);
        }
        let (Some(config), Some(color_space)) = (BitmapConfig::from_tag(header[5]), ColorSpace::from_tag(header[6]))
        else {
            exn::bail!(ErrorKind::InvalidData);
        };
        let width = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let height = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
        let pixels = bytes[CACHE_HEADER_LEN..].to_vec();
        Self::new(width, height, config, pixels)
            .map_err(|e| e.raise(ErrorKind::InvalidData))
            .map(|bitmap| bitmap.with_color_space(color_space))
    }
}

fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3)
}

impl Clone for Bitmap {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            config: self.config,
            color_space: self.color_space,
            pixels: self.pixels.clone(),
            recycled: AtomicBool::new(self.is_recycled()),
        }
    }
}

impl Debug for Bitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("config", &self.config)
            .field("color_space", &self.color_space)
            .field("recycled", &self.is_recycled())
            .finish_non_exhaustive()
    }
}

impl Image for Bitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn byte_count(&self) -> u64 {
        self.pixels.len() as u64
    }

    fn check_valid(&self) -> bool {
        !self.is_recycled()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Decoders turn fetched bytes into an [`Image`].
//!
//! The format is always sniffed from the first [`SNIFF_LEN`] bytes; the MIME
//! type a transport declared is only passed along as a hint. Decoding is
//! blocking work and runs on the decode dispatcher.
//!
//! [`SNIFF_LEN`]: sketch_image::SNIFF_LEN

mod bmp;
mod encoded;

pub use self::bmp::{BmpDecoder, BmpDecoderFactory};
pub use self::encoded::{EncodedImageDecoder, EncodedImageDecoderFactory};
use crate::error::Result;
use crate::fetch::{BoxSyncRead, DataFrom, FetchResult};
use crate::request::{Precision, Request, Scale, Size};
use sketch_image::{BitmapConfig, ColorSpace, Image, ImageFormat, ImageInfo, PeekableReader};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything about a request that influences decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// `None` decodes at original size.
    pub size: Option<Size>,
    pub precision: Precision,
    pub scale: Scale,
    pub bitmap_config: BitmapConfig,
    pub color_space: Option<ColorSpace>,
}

impl DecodeOptions {
    pub fn new(request: &Request, size: Option<Size>) -> Self {
        Self {
            size,
            precision: request.precision(),
            scale: request.scale(),
            bitmap_config: request.bitmap_config().unwrap_or_default(),
            color_space: request.color_space(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecodeResult {
    pub image: Arc<dyn Image>,
    /// Dimensions and format of the source, before any sampling.
    pub info: ImageInfo,
    pub data_from: DataFrom,
    /// Keys of everything applied on top of a plain decode, in order.
    pub transformations: Vec<String>,
    pub extras: HashMap<String, String>,
}

impl DecodeResult {
    pub fn new(image: Arc<dyn Image>, info: ImageInfo, data_from: DataFrom) -> Self {
        Self { image, info, data_from, transformations: Vec::new(), extras: HashMap::new() }
    }

    /// Whether the image differs from what a plain decode at original size
    /// would produce.
    pub fn is_transformed(&self) -> bool {
        !self.transformations.is_empty()
    }
}

pub trait Decoder: Send {
    fn decode(self: Box<Self>, reader: PeekableReader<BoxSyncRead>, options: &DecodeOptions) -> Result<DecodeResult>;
}

pub trait DecoderFactory: Send + Sync {
    /// Used for logging and diagnostics.
    fn name(&self) -> &str;

    /// A decoder for the sniffed `format`, or `None` if this factory can't
    /// handle it. `head` holds up to [`SNIFF_LEN`](sketch_image::SNIFF_LEN)
    /// bytes from the start of the data.
    fn create(
        &self,
        request: &Request,
        fetch: &FetchResult,
        format: ImageFormat,
        head: &[u8],
    ) -> Option<Box<dyn Decoder>>;
}

const MAX_SAMPLE_SIZE: u32 = 1 << 16;

/// The power-of-two subsampling factor for decoding a `width` x `height`
/// image towards `target`.
///
/// [`Precision::LessPixels`] picks the smallest factor whose result has no
/// more pixels than the target. The other precisions never sample below the
/// target on either axis.
pub fn sample_size(width: u32, height: u32, target: Option<Size>, precision: Precision) -> u32 {
    let Some(target) = target else {
        return 1;
    };
    if width == 0 || height == 0 || target.is_empty() {
        return 1;
    }
    let sampled = |sample: u32| Size::new(width.div_ceil(sample), height.div_ceil(sample));
    let mut sample = 1;
    match precision {
        Precision::LessPixels => {
            while sampled(sample).pixels() > target.pixels() && sample < MAX_SAMPLE_SIZE {
                sample *= 2;
            }
        },
        Precision::SameAspectRatio | Precision::Exactly => {
            while sample < MAX_SAMPLE_SIZE {
                let next = sampled(sample * 2);
                if next.width < target.width || next.height < target.height {
                    break;
                }
                sample *= 2;
            }
        },
    }
    sample
}

/// Transformation key recorded when a decoder subsampled the image.
pub fn in_sampled_key(sample_size: u32) -> String {
    format!("InSampled({sample_size})")
}

use crate::decode::{DecodeOptions, DecodeResult, Decoder, DecoderFactory, in_sampled_key, sample_size};
use crate::error::{ErrorKind, Result};
use crate::fetch::{BoxSyncRead, DataFrom, FetchResult};
use crate::request::Request;
use exn::ResultExt;
use sketch_image::error::{ErrorKind as ImageErrorKind, Result as ImageResult};
use sketch_image::{Bitmap, ImageFormat, ImageInfo, PeekableReader};
use std::sync::Arc;

const FILE_HEADER_LEN: usize = 14;
const CORE_HEADER_LEN: u32 = 12;
const INFO_HEADER_LEN: u32 = 40;
const BI_RGB: u32 = 0;
/// Refuse anything that would need more than 1 GiB of RGBA output.
const MAX_OUTPUT_PIXELS: u64 = 1 << 28;

/// The subset of a BMP header needed to read uncompressed pixel rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    data_offset: usize,
    width: u32,
    height: u32,
    top_down: bool,
    bits_per_pixel: u16,
}

impl Header {
    /// Parse a header this decoder supports: uncompressed 24 or 32 bits per
    /// pixel. Anything else is left to other decoders.
    fn parse(head: &[u8]) -> Option<Self> {
        let u16_at = |at: usize| head.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]));
        let u32_at = |at: usize| head.get(at..at + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        if head.get(..2)? != b"BM" {
            return None;
        }
        let data_offset = u32_at(10)? as usize;
        let dib_len = u32_at(FILE_HEADER_LEN)?;
        let (width, height, bits_per_pixel) = if dib_len == CORE_HEADER_LEN {
            (i64::from(u16_at(18)?), i64::from(u16_at(20)?), u16_at(24)?)
        } else if dib_len >= INFO_HEADER_LEN {
            if u32_at(30)? != BI_RGB {
                return None;
            }
            (i64::from(u32_at(18)? as i32), i64::from(u32_at(22)? as i32), u16_at(28)?)
        } else {
            return None;
        };
        if !matches!(bits_per_pixel, 24 | 32) || width <= 0 || height == 0 {
            return None;
        }
        Some(Self {
            data_offset,
            width: u32::try_from(width).ok()?,
            height: u32::try_from(height.abs()).ok()?,
            top_down: height < 0,
            bits_per_pixel,
        })
    }

    fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8)
    }

    /// Rows are padded to a multiple of four bytes.
    fn stride(&self) -> usize {
        (usize::from(self.bits_per_pixel) * self.width as usize).div_ceil(32) * 4
    }
}

/// Decodes uncompressed 24 and 32 bit BMP files into a [`Bitmap`],
/// subsampling by a power of two towards the requested size.
pub struct BmpDecoder {
    header: Header,
    data_from: DataFrom,
}

impl BmpDecoder {
    fn decode_pixels(&self, data: &[u8], options: &DecodeOptions) -> ImageResult<(Bitmap, u32)> {
        let header = &self.header;
        let sample = sample_size(header.width, header.height, options.size, options.precision);
        let (out_width, out_height) = (header.width.div_ceil(sample), header.height.div_ceil(sample));
        if u64::from(out_width) * u64::from(out_height) > MAX_OUTPUT_PIXELS {
            exn::bail!(ImageErrorKind::UnsupportedLayout(format!("{out_width}x{out_height} is too large")));
        }

        let (stride, bpp) = (header.stride(), header.bytes_per_pixel());
        let last_row_end = header.data_offset + stride * (header.height as usize - 1) + header.width as usize * bpp;
        if data.len() < last_row_end {
            exn::bail!(ImageErrorKind::BufferSize { expected: last_row_end, actual: data.len() });
        }

        let mut rgba = Vec::with_capacity(out_width as usize * out_height as usize * 4);
        for out_y in 0..out_height {
            let y = (out_y * sample) as usize;
            let row = if header.top_down { y } else { header.height as usize - 1 - y };
            let row_start = header.data_offset + row * stride;
            for out_x in 0..out_width {
                let at = row_start + (out_x * sample) as usize * bpp;
                let (b, g, r) = (data[at], data[at + 1], data[at + 2]);
                // Alpha in uncompressed 32 bit files is unreliable; most
                // writers leave it zeroed.
                rgba.extend_from_slice(&[r, g, b, 0xFF]);
            }
        }
        let bitmap = Bitmap::from_rgba(out_width, out_height, rgba, options.bitmap_config)?;
        Ok((bitmap.with_color_space(options.color_space), sample))
    }
}

impl Decoder for BmpDecoder {
    fn decode(self: Box<Self>, reader: PeekableReader<BoxSyncRead>, options: &DecodeOptions) -> Result<DecodeResult> {
        let data = reader.into_bytes().or_raise(|| ErrorKind::Decode)?;
        let (bitmap, sample) = self.decode_pixels(&data, options).or_raise(|| ErrorKind::Decode)?;
        tracing::trace!(
            width = self.header.width,
            height = self.header.height,
            sample,
            "decoded bmp"
        );
        let info = ImageInfo::new(self.header.width, self.header.height, ImageFormat::Bmp);
        let mut result = DecodeResult::new(Arc::new(bitmap), info, self.data_from);
        if sample > 1 {
            result.transformations.push(in_sampled_key(sample));
        }
        Ok(result)
    }
}

#[derive(Debug, Default)]
pub struct BmpDecoderFactory;

impl DecoderFactory for BmpDecoderFactory {
    fn name(&self) -> &str {
        "bmp"
    }

    fn create(
        &self,
        _request: &Request,
        fetch: &FetchResult,
        format: ImageFormat,
        head: &[u8],
    ) -> Option<Box<dyn Decoder>> {
        if format != ImageFormat::Bmp {
            return None;
        }
        let header = Header::parse(head)?;
        Some(Box::new(BmpDecoder { header, data_from: fetch.data_from() }))
    }
}

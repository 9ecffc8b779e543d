use crate::decode::{DecodeOptions, DecodeResult, Decoder, DecoderFactory};
use crate::error::{ErrorKind, Result};
use crate::fetch::{BoxSyncRead, DataFrom, FetchResult};
use crate::request::Request;
use exn::ResultExt;
use sketch_image::{EncodedImage, ImageFormat, PeekableReader};
use std::sync::Arc;

/// Passes compressed bytes through as an [`EncodedImage`] once their header
/// checks out. Rasterizing is left to whatever displays the image.
pub struct EncodedImageDecoder {
    format: ImageFormat,
    data_from: DataFrom,
}

impl Decoder for EncodedImageDecoder {
    fn decode(self: Box<Self>, reader: PeekableReader<BoxSyncRead>, _options: &DecodeOptions) -> Result<DecodeResult> {
        let data = reader.into_bytes().or_raise(|| ErrorKind::Decode)?;
        let image = EncodedImage::new(self.format, data).or_raise(|| ErrorKind::Decode)?;
        let info = image.info();
        Ok(DecodeResult::new(Arc::new(image), info, self.data_from))
    }
}

#[derive(Debug, Default)]
pub struct EncodedImageDecoderFactory;

impl DecoderFactory for EncodedImageDecoderFactory {
    fn name(&self) -> &str {
        "encoded"
    }

    fn create(
        &self,
        _request: &Request,
        fetch: &FetchResult,
        format: ImageFormat,
        _head: &[u8],
    ) -> Option<Box<dyn Decoder>> {
        (format != ImageFormat::Unknown)
            .then(|| Box::new(EncodedImageDecoder { format, data_from: fetch.data_from() }) as Box<dyn Decoder>)
    }
}

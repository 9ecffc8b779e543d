use crate::decode::DecodeResult;
use crate::error::Error;
use crate::fetch::DataFrom;
use sketch_image::{Image, ImageFormat, ImageInfo};
use sketch_memory::{Lease, Value};
use std::collections::HashMap;
use std::sync::Arc;

const EXTRA_WIDTH: &str = "sketch:width";
const EXTRA_HEIGHT: &str = "sketch:height";
const EXTRA_FORMAT: &str = "sketch:format";
const EXTRA_TRANSFORMATIONS: &str = "sketch:transformations";
const EXTRA_PREFIX: &str = "sketch:";

/// A successfully loaded image.
///
/// When the image is held by the memory cache, the data carries a
/// [`Lease`] on the entry; cloning the data acquires another one and
/// dropping it releases it.
#[derive(Clone, Debug)]
pub struct ImageData {
    image: Arc<dyn Image>,
    info: ImageInfo,
    cache_key: String,
    data_from: DataFrom,
    transformations: Vec<String>,
    extras: HashMap<String, String>,
    lease: Option<Lease>,
}

impl ImageData {
    pub(crate) fn from_decode(cache_key: String, result: DecodeResult) -> Self {
        Self {
            image: result.image,
            info: result.info,
            cache_key,
            data_from: result.data_from,
            transformations: result.transformations,
            extras: result.extras,
            lease: None,
        }
    }

    /// Rebuild from a memory cache entry written by
    /// [`to_memory_value`](Self::to_memory_value).
    pub(crate) fn from_lease(lease: Lease) -> Self {
        let value = lease.value();
        let extras = value.extras();
        let dimension = |name: &str, fallback: u32| extras.get(name).and_then(|v| v.parse().ok()).unwrap_or(fallback);
        let info = ImageInfo::new(
            dimension(EXTRA_WIDTH, value.image().width()),
            dimension(EXTRA_HEIGHT, value.image().height()),
            extras.get(EXTRA_FORMAT).and_then(|f| f.parse().ok()).unwrap_or(ImageFormat::Unknown),
        );
        let transformations = extras
            .get(EXTRA_TRANSFORMATIONS)
            .map(|t| t.split('\t').filter(|k| !k.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let user_extras = extras.iter().filter(|(k, _)| !k.starts_with(EXTRA_PREFIX)).map(|(k, v)| (k.clone(), v.clone()));
        Self {
            image: value.image().clone(),
            info,
            cache_key: lease.key().to_string(),
            data_from: DataFrom::MemoryCache,
            transformations,
            extras: user_extras.collect(),
            lease: Some(lease),
        }
    }

    pub(crate) fn to_memory_value(&self) -> Value {
        let mut extras = self.extras.clone();
        extras.insert(EXTRA_WIDTH.to_string(), self.info.width.to_string());
        extras.insert(EXTRA_HEIGHT.to_string(), self.info.height.to_string());
        extras.insert(EXTRA_FORMAT.to_string(), self.info.format.as_str().to_string());
        extras.insert(EXTRA_TRANSFORMATIONS.to_string(), self.transformations.join("\t"));
        Value::new(self.image.clone()).with_extras(extras)
    }

    pub(crate) fn extend_extras(&mut self, extras: HashMap<String, String>) {
        self.extras.extend(extras);
    }

    pub(crate) fn with_lease(mut self, lease: Option<Lease>) -> Self {
        self.lease = lease;
        self
    }

    pub fn image(&self) -> &Arc<dyn Image> {
        &self.image
    }

    /// Dimensions and format of the source before sampling or
    /// transformations.
    pub fn info(&self) -> ImageInfo {
        self.info
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn data_from(&self) -> DataFrom {
        self.data_from
    }

    pub fn transformations(&self) -> &[String] {
        &self.transformations
    }

    pub fn extras(&self) -> &HashMap<String, String> {
        &self.extras
    }

    /// The memory cache lease pinning this image, if it is cached.
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }
}

/// The terminal outcome of a request. Every caller receives exactly one.
#[derive(Clone, Debug)]
pub enum ImageResult {
    Success(ImageData),
    /// Shared by every caller that joined the same execution.
    Error(Arc<Error>),
    Cancelled,
}

impl ImageResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ImageResult::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImageResult::Cancelled)
    }

    pub fn data(&self) -> Option<&ImageData> {
        match self {
            ImageResult::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<ImageData> {
        match self {
            ImageResult::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            ImageResult::Error(error) => Some(error),
            _ => None,
        }
    }
}

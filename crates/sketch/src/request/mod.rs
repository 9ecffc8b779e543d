//! Immutable image requests and their builder.

mod policy;
mod size;

pub use self::policy::{CachePolicy, Depth};
pub use self::size::{Precision, Scale, Size, SizeResolver, SizeSpec};
use crate::lifecycle::Lifecycle;
use crate::listener::Listener;
use crate::transform::Transformation;
use sketch_image::{BitmapConfig, ColorSpace};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to load one image.
///
/// Requests are cheap to clone and never change once built; use
/// [`to_builder`](Self::to_builder) to derive a modified copy. Two requests
/// built independently with the same effective parameters produce the same
/// cache key, so they share cache entries and in-flight executions.
///
/// ```
/// use sketch::request::{CachePolicy, Request, Size};
///
/// let request = Request::builder("https://example.com/cat.jpg")
///     .size(Size::new(300, 200))
///     .result_cache_policy(CachePolicy::Disabled)
///     .build();
/// assert_eq!(request.uri(), "https://example.com/cat.jpg");
/// ```
#[derive(Clone)]
pub struct Request {
    uri: String,
    size: SizeSpec,
    precision: Precision,
    scale: Scale,
    bitmap_config: Option<BitmapConfig>,
    color_space: Option<ColorSpace>,
    transformations: Vec<Arc<dyn Transformation>>,
    memory_cache_policy: CachePolicy,
    result_cache_policy: CachePolicy,
    download_cache_policy: CachePolicy,
    depth: Depth,
    timeout: Option<Duration>,
    pause_when_paused: bool,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    listeners: Vec<Arc<dyn Listener>>,
    crossfade: Option<Duration>,
}

impl Request {
    pub fn builder(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(uri)
    }

    pub fn new(uri: impl Into<String>) -> Self {
        Self::builder(uri).build()
    }

    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder { request: self.clone() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The URI scheme (lowercased), or an empty string for scheme-less URIs
    /// such as plain paths.
    pub fn scheme(&self) -> String {
        crate::key::scheme(&self.uri).unwrap_or_default()
    }

    pub fn size(&self) -> &SizeSpec {
        &self.size
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn bitmap_config(&self) -> Option<BitmapConfig> {
        self.bitmap_config
    }

    pub fn color_space(&self) -> Option<ColorSpace> {
        self.color_space
    }

    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    pub fn memory_cache_policy(&self) -> CachePolicy {
        self.memory_cache_policy
    }

    pub fn result_cache_policy(&self) -> CachePolicy {
        self.result_cache_policy
    }

    pub fn download_cache_policy(&self) -> CachePolicy {
        self.download_cache_policy
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Request specific timeout, overriding the configured default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether execution waits while the [`PauseSwitch`](crate::PauseSwitch)
    /// is paused.
    pub fn pause_when_paused(&self) -> bool {
        self.pause_when_paused
    }

    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref()
    }

    pub fn listeners(&self) -> &[Arc<dyn Listener>] {
        &self.listeners
    }

    /// Display hint only; does not take part in the cache key.
    pub fn crossfade(&self) -> Option<Duration> {
        self.crossfade
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Request")
            .field("uri", &self.uri)
            .field("size", &self.size)
            .field("precision", &self.precision)
            .field("scale", &self.scale)
            .field("bitmap_config", &self.bitmap_config)
            .field("color_space", &self.color_space)
            .field("transformations", &self.transformations)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            request: Request {
                uri: uri.into(),
                size: SizeSpec::Original,
                precision: Precision::default(),
                scale: Scale::default(),
                bitmap_config: None,
                color_space: None,
                transformations: Vec::new(),
                memory_cache_policy: CachePolicy::Enabled,
                result_cache_policy: CachePolicy::Enabled,
                download_cache_policy: CachePolicy::Enabled,
                depth: Depth::Network,
                timeout: None,
                pause_when_paused: false,
                lifecycle: None,
                listeners: Vec::new(),
                crossfade: None,
            },
        }
    }

    pub fn size(mut self, size: impl Into<SizeSpec>) -> Self {
        self.request.size = size.into();
        self
    }

    pub fn size_resolver(mut self, resolver: impl SizeResolver + 'static) -> Self {
        self.request.size = SizeSpec::Resolver(Arc::new(resolver));
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.request.precision = precision;
        self
    }

    pub fn scale(mut self, scale: Scale) -> Self {
        self.request.scale = scale;
        self
    }

    pub fn bitmap_config(mut self, config: BitmapConfig) -> Self {
        self.request.bitmap_config = Some(config);
        self
    }

    pub fn color_space(mut self, color_space: ColorSpace) -> Self {
        self.request.color_space = Some(color_space);
        self
    }

    /// Append a transformation. Transformations run in the order added.
    pub fn transformation(mut self, transformation: impl Transformation + 'static) -> Self {
        self.request.transformations.push(Arc::new(transformation));
        self
    }

    pub fn transformations(mut self, transformations: Vec<Arc<dyn Transformation>>) -> Self {
        self.request.transformations = transformations;
        self
    }

    pub fn memory_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.memory_cache_policy = policy;
        self
    }

    pub fn result_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.result_cache_policy = policy;
        self
    }

    pub fn download_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.download_cache_policy = policy;
        self
    }

    pub fn depth(mut self, depth: Depth) -> Self {
        self.request.depth = depth;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    pub fn pause_when_paused(mut self, pause: bool) -> Self {
        self.request.pause_when_paused = pause;
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.request.lifecycle = Some(lifecycle);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.request.listeners.push(listener);
        self
    }

    pub fn crossfade(mut self, duration: Duration) -> Self {
        self.request.crossfade = Some(duration);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

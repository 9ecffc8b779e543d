//! The three interceptor chains a request runs through.
//!
//! ```text
//! request chain: PauseControl -> Timeout -> MemoryCache -> [decode chain]
//! decode chain:  ResultCache -> Transformation -> [fetch chain, sniff, decode]
//! fetch chain:   DownloadCache -> [fetcher]
//! ```
//!
//! Interceptors are sorted by [`sort_weight`](RequestInterceptor::sort_weight)
//! (lower runs first, i.e. further out) with registration order breaking
//! ties. Each one receives a chain and may return early, do work before
//! calling [`proceed`](RequestChain::proceed), or post-process what
//! `proceed` returns. `proceed` checks for cancellation on the way in and on
//! the way out.

mod download_cache;
mod memory_cache;
mod pause;
mod result_cache;
mod timeout;
mod transformation;

pub use self::download_cache::DownloadCacheInterceptor;
pub use self::memory_cache::MemoryCacheInterceptor;
pub use self::pause::{PauseControlInterceptor, PauseSwitch};
pub use self::result_cache::ResultCacheInterceptor;
pub use self::timeout::TimeoutInterceptor;
pub use self::transformation::TransformationInterceptor;
use crate::context::RequestContext;
use crate::decode::DecodeResult;
use crate::error::{ErrorKind, Result};
use crate::fetch::{BoxSyncRead, FetchResult};
use crate::request::Request;
use crate::result::ImageData;
use async_trait::async_trait;
use exn::ResultExt;
use sketch_image::ImageFormat;
use std::sync::Arc;

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &str;

    fn sort_weight(&self) -> i32 {
        0
    }

    async fn intercept(&self, chain: RequestChain<'_>) -> Result<ImageData>;
}

#[async_trait]
pub trait DecodeInterceptor: Send + Sync {
    fn name(&self) -> &str;

    fn sort_weight(&self) -> i32 {
        0
    }

    async fn intercept(&self, chain: DecodeChain<'_>) -> Result<DecodeResult>;
}

#[async_trait]
pub trait FetchInterceptor: Send + Sync {
    fn name(&self) -> &str;

    fn sort_weight(&self) -> i32 {
        0
    }

    async fn intercept(&self, chain: FetchChain<'_>) -> Result<FetchResult>;
}

pub struct RequestChain<'a> {
    context: &'a RequestContext,
    interceptors: &'a [Arc<dyn RequestInterceptor>],
}

impl<'a> RequestChain<'a> {
    pub(crate) fn new(context: &'a RequestContext) -> Self {
        Self { context, interceptors: context.sketch().components().request_interceptors() }
    }

    pub fn context(&self) -> &'a RequestContext {
        self.context
    }

    pub fn request(&self) -> &'a Request {
        self.context.request()
    }

    /// Run the rest of the chain.
    pub async fn proceed(self) -> Result<ImageData> {
        let context = self.context;
        context.check_cancelled()?;
        let result = match self.interceptors.split_first() {
            Some((interceptor, rest)) => interceptor.intercept(RequestChain { context, interceptors: rest }).await,
            None => {
                let decoded = DecodeChain::new(context).proceed().await?;
                let mut data = ImageData::from_decode(context.cache_key().to_string(), decoded);
                data.extend_extras(context.extras());
                Ok(data)
            },
        };
        context.check_cancelled()?;
        result
    }
}

pub struct DecodeChain<'a> {
    context: &'a RequestContext,
    interceptors: &'a [Arc<dyn DecodeInterceptor>],
}

impl<'a> DecodeChain<'a> {
    pub(crate) fn new(context: &'a RequestContext) -> Self {
        Self { context, interceptors: context.sketch().components().decode_interceptors() }
    }

    pub fn context(&self) -> &'a RequestContext {
        self.context
    }

    pub fn request(&self) -> &'a Request {
        self.context.request()
    }

    pub async fn proceed(self) -> Result<DecodeResult> {
        let context = self.context;
        context.check_cancelled()?;
        let result = match self.interceptors.split_first() {
            Some((interceptor, rest)) => interceptor.intercept(DecodeChain { context, interceptors: rest }).await,
            None => decode(context).await,
        };
        context.check_cancelled()?;
        result
    }
}

pub struct FetchChain<'a> {
    context: &'a RequestContext,
    interceptors: &'a [Arc<dyn FetchInterceptor>],
}

impl<'a> FetchChain<'a> {
    pub(crate) fn new(context: &'a RequestContext) -> Self {
        Self { context, interceptors: context.sketch().components().fetch_interceptors() }
    }

    pub fn context(&self) -> &'a RequestContext {
        self.context
    }

    pub fn request(&self) -> &'a Request {
        self.context.request()
    }

    pub async fn proceed(self) -> Result<FetchResult> {
        let context = self.context;
        context.check_cancelled()?;
        let result = match self.interceptors.split_first() {
            Some((interceptor, rest)) => interceptor.intercept(FetchChain { context, interceptors: rest }).await,
            None => fetch(context).await,
        };
        context.check_cancelled()?;
        result
    }
}

/// Terminal of the decode chain: fetch, sniff, then decode on the decode
/// dispatcher.
async fn decode(context: &RequestContext) -> Result<DecodeResult> {
    let fetched = FetchChain::new(context).proceed().await?;
    let reader: BoxSyncRead = fetched.source.sync_reader().await.map_err(ErrorKind::fetch)?;
    let components = context.sketch().components().clone();
    let request = context.request().clone();
    let options = context.decode_options();
    let decoded = context
        .sketch()
        .dispatchers()
        .decode(move || -> Result<DecodeResult> {
            let (format, peekable) = ImageFormat::sniff(reader).or_raise(|| ErrorKind::Decode)?;
            let decoder = components.new_decoder_or_throw(&request, &fetched, format, peekable.head())?;
            decoder.decode(peekable, &options)
        })
        .await??;
    tracing::debug!(
        width = decoded.image.width(),
        height = decoded.image.height(),
        format = %decoded.info.format,
        from = %decoded.data_from,
        "decoded"
    );
    Ok(decoded)
}

/// Terminal of the fetch chain.
async fn fetch(context: &RequestContext) -> Result<FetchResult> {
    let request = context.request();
    let fetcher = context.sketch().components().new_fetcher_or_throw(request)?;
    let from = fetcher.data_from();
    if !request.depth().allows(from) {
        exn::bail!(ErrorKind::Depth { depth: request.depth(), from });
    }
    context.sketch().dispatchers().network(fetcher.fetch()).await?.map_err(ErrorKind::fetch)
}

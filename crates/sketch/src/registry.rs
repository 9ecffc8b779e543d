//! Ordered, immutable sets of fetchers, decoders and interceptors.

use crate::decode::{BmpDecoderFactory, Decoder, DecoderFactory, EncodedImageDecoderFactory};
use crate::error::{ErrorKind, Result};
use crate::fetch::{DataUriFetcherFactory, FetchResult, Fetcher, FetcherFactory, FileFetcherFactory};
use crate::interceptor::{
    DecodeInterceptor, DownloadCacheInterceptor, FetchInterceptor, MemoryCacheInterceptor, PauseControlInterceptor,
    RequestInterceptor, ResultCacheInterceptor, TimeoutInterceptor, TransformationInterceptor,
};
use crate::request::Request;
use sketch_image::ImageFormat;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

#[derive(Clone, Default)]
struct Components {
    fetchers: Vec<Arc<dyn FetcherFactory>>,
    decoders: Vec<Arc<dyn DecoderFactory>>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    decode_interceptors: Vec<Arc<dyn DecodeInterceptor>>,
    fetch_interceptors: Vec<Arc<dyn FetchInterceptor>>,
}

/// Fetcher and decoder factories plus interceptors, consulted in
/// registration order: the first factory that accepts a request wins.
///
/// A registry never changes once built. Derive a modified copy with
/// [`to_builder`](Self::to_builder) or combine two with
/// [`merged`](Self::merged).
///
/// ```
/// use sketch::ComponentRegistry;
/// use sketch::fetch::FileFetcherFactory;
///
/// let registry = ComponentRegistry::builder().add_fetcher(FileFetcherFactory).build();
/// assert_eq!(registry.fetchers().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    inner: Arc<Components>,
}

impl ComponentRegistry {
    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::default()
    }

    /// The built-in components.
    pub fn defaults() -> Self {
        let builder = Self::builder().add_fetcher(FileFetcherFactory).add_fetcher(DataUriFetcherFactory);
        #[cfg(feature = "http")]
        let builder = builder.add_fetcher(crate::fetch::HttpFetcherFactory::new());
        builder
            .add_decoder(BmpDecoderFactory)
            .add_decoder(EncodedImageDecoderFactory)
            .add_request_interceptor(PauseControlInterceptor)
            .add_request_interceptor(TimeoutInterceptor)
            .add_request_interceptor(MemoryCacheInterceptor)
            .add_decode_interceptor(ResultCacheInterceptor)
            .add_decode_interceptor(TransformationInterceptor)
            .add_fetch_interceptor(DownloadCacheInterceptor)
            .build()
    }

    pub fn to_builder(&self) -> ComponentRegistryBuilder {
        ComponentRegistryBuilder { components: (*self.inner).clone() }
    }

    /// This registry's components followed by `other`'s.
    pub fn merged(&self, other: &ComponentRegistry) -> Self {
        let mut builder = self.to_builder();
        let theirs = &other.inner;
        builder.components.fetchers.extend(theirs.fetchers.iter().cloned());
        builder.components.decoders.extend(theirs.decoders.iter().cloned());
        builder.components.request_interceptors.extend(theirs.request_interceptors.iter().cloned());
        builder.components.decode_interceptors.extend(theirs.decode_interceptors.iter().cloned());
        builder.components.fetch_interceptors.extend(theirs.fetch_interceptors.iter().cloned());
        builder.build()
    }

    pub fn is_empty(&self) -> bool {
        let c = &self.inner;
        c.fetchers.is_empty()
            && c.decoders.is_empty()
            && c.request_interceptors.is_empty()
            && c.decode_interceptors.is_empty()
            && c.fetch_interceptors.is_empty()
    }

    pub fn fetchers(&self) -> &[Arc<dyn FetcherFactory>] {
        &self.inner.fetchers
    }

    pub fn decoders(&self) -> &[Arc<dyn DecoderFactory>] {
        &self.inner.decoders
    }

    /// Sorted by weight, outermost first.
    pub fn request_interceptors(&self) -> &[Arc<dyn RequestInterceptor>] {
        &self.inner.request_interceptors
    }

    /// Sorted by weight, outermost first.
    pub fn decode_interceptors(&self) -> &[Arc<dyn DecodeInterceptor>] {
        &self.inner.decode_interceptors
    }

    /// Sorted by weight, outermost first.
    pub fn fetch_interceptors(&self) -> &[Arc<dyn FetchInterceptor>] {
        &self.inner.fetch_interceptors
    }

    /// A fetcher from the first factory that accepts `request`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoFetcher`] if no factory does. This is a configuration
    /// problem and not worth retrying.
    pub fn new_fetcher_or_throw(&self, request: &Request) -> Result<Box<dyn Fetcher>> {
        for factory in &self.inner.fetchers {
            if let Some(fetcher) = factory.create(request) {
                tracing::trace!(factory = factory.name(), uri = request.uri(), "selected fetcher");
                return Ok(fetcher);
            }
        }
        exn::bail!(ErrorKind::NoFetcher(request.scheme()))
    }

    /// A decoder from the first factory that accepts the sniffed `format`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NoDecoder`] if no factory does.
    pub fn new_decoder_or_throw(
        &self,
        request: &Request,
        fetch: &FetchResult,
        format: ImageFormat,
        head: &[u8],
    ) -> Result<Box<dyn Decoder>> {
        for factory in &self.inner.decoders {
            if let Some(decoder) = factory.create(request, fetch, format, head) {
                tracing::trace!(factory = factory.name(), %format, "selected decoder");
                return Ok(decoder);
            }
        }
        exn::bail!(ErrorKind::NoDecoder(format.mime_type().to_string()))
    }
}

impl Debug for ComponentRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let c = &self.inner;
        f.debug_struct("ComponentRegistry")
            .field("fetchers", &c.fetchers.iter().map(|x| x.name()).collect::<Vec<_>>())
            .field("decoders", &c.decoders.iter().map(|x| x.name()).collect::<Vec<_>>())
            .field("request_interceptors", &c.request_interceptors.iter().map(|x| x.name()).collect::<Vec<_>>())
            .field("decode_interceptors", &c.decode_interceptors.iter().map(|x| x.name()).collect::<Vec<_>>())
            .field("fetch_interceptors", &c.fetch_interceptors.iter().map(|x| x.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct ComponentRegistryBuilder {
    components: Components,
}

impl ComponentRegistryBuilder {
    pub fn add_fetcher(self, factory: impl FetcherFactory + 'static) -> Self {
        self.add_fetcher_arc(Arc::new(factory))
    }

    pub fn add_fetcher_arc(mut self, factory: Arc<dyn FetcherFactory>) -> Self {
        self.components.fetchers.push(factory);
        self
    }

    pub fn add_decoder(mut self, factory: impl DecoderFactory + 'static) -> Self {
        self.components.decoders.push(Arc::new(factory));
        self
    }

    pub fn add_request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.components.request_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_decode_interceptor(mut self, interceptor: impl DecodeInterceptor + 'static) -> Self {
        self.components.decode_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_fetch_interceptor(mut self, interceptor: impl FetchInterceptor + 'static) -> Self {
        self.components.fetch_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Sort interceptors by weight. The sort is stable, so equal weights keep
    /// registration order.
    pub fn build(mut self) -> ComponentRegistry {
        let c = &mut self.components;
        c.request_interceptors.sort_by_key(|i| i.sort_weight());
        c.decode_interceptors.sort_by_key(|i| i.sort_weight());
        c.fetch_interceptors.sort_by_key(|i| i.sort_weight());
        ComponentRegistry { inner: Arc::new(self.components) }
    }
}

/// Contributes components when a [`Sketch`](crate::Sketch) is built, e.g.
/// from an optional integration crate. Providers register after components
/// passed explicitly and before the built-in defaults.
pub trait ComponentProvider: Send + Sync {
    fn name(&self) -> &str;

    fn components(&self) -> ComponentRegistry;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{DataFrom, MemoryFetcherFactory};
    use crate::interceptor::RequestChain;
    use crate::result::ImageData;
    use async_trait::async_trait;

    struct Named(&'static str, i32);

    #[async_trait]
    impl RequestInterceptor for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn sort_weight(&self) -> i32 {
            self.1
        }

        async fn intercept(&self, chain: RequestChain<'_>) -> Result<ImageData> {
            chain.proceed().await
        }
    }

    fn names(registry: &ComponentRegistry) -> Vec<&str> {
        registry.request_interceptors().iter().map(|i| i.name()).collect()
    }

    #[test]
    fn test_interceptors_sorted_stably() {
        let registry = ComponentRegistry::builder()
            .add_request_interceptor(Named("late", 10))
            .add_request_interceptor(Named("first", -5))
            .add_request_interceptor(Named("tie-a", 0))
            .add_request_interceptor(Named("tie-b", 0))
            .build();
        assert_eq!(names(&registry), ["first", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_defaults_order() {
        let registry = ComponentRegistry::defaults();
        assert_eq!(names(&registry), ["pause-control", "timeout", "memory-cache"]);
        let decode: Vec<_> = registry.decode_interceptors().iter().map(|i| i.name()).collect();
        assert_eq!(decode, ["result-cache", "transformation"]);
        assert_eq!(registry.decoders()[0].name(), "bmp");
    }

    #[test]
    fn test_first_fetcher_wins() {
        let memory = MemoryFetcherFactory::new().with_data_from(DataFrom::Network);
        memory.insert("/tmp/a.bmp", b"BM".to_vec());
        let registry = ComponentRegistry::builder().add_fetcher(memory).build().merged(&ComponentRegistry::defaults());
        let fetcher = registry.new_fetcher_or_throw(&Request::new("/tmp/a.bmp")).unwrap();
        assert_eq!(fetcher.data_from(), DataFrom::Network);
        let fetcher = registry.new_fetcher_or_throw(&Request::new("/tmp/b.bmp")).unwrap();
        assert_eq!(fetcher.data_from(), DataFrom::LocalFile);
    }

    #[test]
    fn test_no_fetcher() {
        let Err(err) = ComponentRegistry::defaults().new_fetcher_or_throw(&Request::new("ftp://x/a.png")) else {
            panic!("ftp has no fetcher");
        };
        assert_eq!(*err, ErrorKind::NoFetcher("ftp".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_to_builder_leaves_original() {
        let original = ComponentRegistry::builder().add_fetcher(FileFetcherFactory).build();
        let extended = original.to_builder().add_fetcher(DataUriFetcherFactory).build();
        assert_eq!(original.fetchers().len(), 1);
        assert_eq!(extended.fetchers().len(), 2);
        assert!(ComponentRegistry::default().is_empty());
    }
}

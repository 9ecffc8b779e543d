use crate::context::RequestContext;
use crate::dispatch::Dispatchers;
use crate::error::{Error, ErrorKind, Result};
use crate::fetch::DataFrom;
use crate::interceptor::{PauseSwitch, RequestChain};
use crate::key;
use crate::lifecycle;
use crate::registry::{ComponentProvider, ComponentRegistry};
use crate::request::{Request, Size};
use crate::result::{ImageData, ImageResult};
use exn::ResultExt;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use sketch_config::Config;
use sketch_disk::DiskCache;
use sketch_memory::MemoryCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

type SharedResult = Shared<BoxFuture<'static, ImageResult>>;

/// One running execution, shared by every caller with the same execution key.
struct InFlight {
    id: u64,
    future: SharedResult,
    attached: usize,
    token: CancellationToken,
}

struct Inner {
    config: Config,
    components: ComponentRegistry,
    memory_cache: MemoryCache,
    download_cache: DiskCache,
    result_cache: DiskCache,
    dispatchers: Dispatchers,
    pause: PauseSwitch,
    /// Keyed by [`key::execution_key`].
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_job: AtomicU64,
}

/// The image loader: caches, components and the in-flight executions that
/// tie them together.
///
/// Cloning is cheap and every clone shares the same state. There is no
/// global instance; create one at startup and pass it around.
///
/// ```no_run
/// # async fn run() -> sketch::error::Result<()> {
/// use sketch::{Request, Sketch};
///
/// let sketch = Sketch::builder(sketch_config::Config::default()).build()?;
/// let result = sketch.execute(Request::new("/tmp/photo.bmp")).await;
/// if let Some(data) = result.data() {
///     println!("{}x{} from {}", data.info().width, data.info().height, data.data_from());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Sketch {
    inner: Arc<Inner>,
}

impl Sketch {
    pub fn builder(config: Config) -> SketchBuilder {
        SketchBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    pub fn memory_cache(&self) -> &MemoryCache {
        &self.inner.memory_cache
    }

    pub fn download_cache(&self) -> &DiskCache {
        &self.inner.download_cache
    }

    pub fn result_cache(&self) -> &DiskCache {
        &self.inner.result_cache
    }

    pub fn dispatchers(&self) -> &Dispatchers {
        &self.inner.dispatchers
    }

    pub fn pause_switch(&self) -> &PauseSwitch {
        &self.inner.pause
    }

    /// Number of executions currently running.
    pub fn in_flight_len(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Empty the memory cache and both disk caches.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::DiskCache`] if a disk cache could not be cleared.
    pub fn clear_caches(&self) -> Result<()> {
        self.inner.memory_cache.clear();
        self.inner.download_cache.clear().or_raise(|| ErrorKind::DiskCache)?;
        self.inner.result_cache.clear().or_raise(|| ErrorKind::DiskCache)?;
        tracing::info!("cleared all caches");
        Ok(())
    }

    /// Load an image, waiting until it is available.
    ///
    /// Never fails: every problem is reported as [`ImageResult::Error`], and
    /// lifecycle destruction as [`ImageResult::Cancelled`]. Dropping the
    /// returned future detaches this caller; the shared execution keeps
    /// running while other callers are still attached.
    #[tracing::instrument(skip_all, fields(uri = request.uri()))]
    pub async fn execute(&self, request: Request) -> ImageResult {
        let notifier = Notifier::start(&request);
        let result = self.gated(&request).await;
        notifier.finish(&result);
        result
    }

    /// Start loading in the background. The returned handle can cancel this
    /// caller's interest or wait for the outcome.
    pub fn enqueue(&self, request: Request) -> Disposable {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let sketch = self.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = sketch.execute(request) => result,
                () = cancelled.cancelled() => ImageResult::Cancelled,
            }
        });
        Disposable { token, handle }
    }

    /// Hold the request until its lifecycle is started, and abandon it when
    /// the lifecycle is destroyed.
    async fn gated(&self, request: &Request) -> ImageResult {
        let Some(lifecycle) = request.lifecycle() else {
            return self.load(request).await;
        };
        let mut receiver = lifecycle.subscribe();
        if !lifecycle::wait_started(&mut receiver).await {
            tracing::debug!("lifecycle destroyed before start");
            return ImageResult::Cancelled;
        }
        tokio::select! {
            result = self.load(request) => result,
            () = lifecycle::destroyed(receiver) => {
                tracing::debug!("lifecycle destroyed");
                ImageResult::Cancelled
            },
        }
    }

    async fn load(&self, request: &Request) -> ImageResult {
        let size = request.size().resolve().await;
        let cache_key = key::cache_key(request, size);
        if let Some(data) = self.memory_hit(request, &cache_key) {
            return ImageResult::Success(data);
        }
        if !request.depth().allows(DataFrom::ResultCache) {
            tracing::debug!(key = %cache_key, "memory miss for memory-only request");
            let err = Error::from(ErrorKind::Depth { depth: request.depth(), from: DataFrom::ResultCache });
            return ImageResult::Error(Arc::new(err));
        }
        let job_key = key::execution_key(request, &cache_key);
        match self.attach(request, size, cache_key, job_key) {
            Attach::Ready(data) => ImageResult::Success(data),
            Attach::Waiting(mut attachment) => attachment.wait().await,
        }
    }

    fn memory_hit(&self, request: &Request, cache_key: &str) -> Option<ImageData> {
        if !request.memory_cache_policy().read_enabled() {
            return None;
        }
        let lease = self.inner.memory_cache.get(cache_key)?;
        tracing::debug!(key = %cache_key, "memory cache hit");
        Some(ImageData::from_lease(lease))
    }

    /// Join the execution running for `job_key`, or start one. Check and
    /// insert happen under one lock so two callers can never both start.
    fn attach(&self, request: &Request, size: Option<Size>, cache_key: String, job_key: String) -> Attach {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(data) = self.memory_hit(request, &cache_key) {
            return Attach::Ready(data);
        }
        if let Some(existing) = in_flight.get_mut(&job_key) {
            existing.attached += 1;
            tracing::debug!(key = %cache_key, job = existing.id, attached = existing.attached, "joined in-flight execution");
            return Attach::Waiting(Attachment {
                sketch: self.clone(),
                job_key,
                id: existing.id,
                future: existing.future.clone(),
                done: false,
            });
        }

        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let context = RequestContext::resolved(self.clone(), request.clone(), size, cache_key.clone(), token.clone());
        let future = self.spawn(id, job_key.clone(), context);
        tracing::debug!(key = %cache_key, job = id, "started execution");
        in_flight.insert(job_key.clone(), InFlight { id, future: future.clone(), attached: 1, token });
        Attach::Waiting(Attachment { sketch: self.clone(), job_key, id, future, done: false })
    }

    fn spawn(&self, id: u64, job_key: String, context: RequestContext) -> SharedResult {
        let span = tracing::debug_span!("job", id, key = %context.cache_key());
        let record = Record { sketch: self.clone(), job_key, id };
        let handle = tokio::spawn(
            async move {
                let _record = record;
                let token = context.token().clone();
                tokio::select! {
                    () = token.cancelled() => ImageResult::Cancelled,
                    result = RequestChain::new(&context).proceed() => match result {
                        Ok(data) => ImageResult::Success(data),
                        Err(_) if token.is_cancelled() => ImageResult::Cancelled,
                        Err(err) if *err == ErrorKind::Cancelled => ImageResult::Cancelled,
                        Err(err) => {
                            tracing::debug!(error = ?err, "execution failed");
                            ImageResult::Error(Arc::new(err))
                        },
                    },
                }
            }
            .instrument(span),
        );
        join(handle).boxed().shared()
    }

    fn detach(&self, job_key: &str, id: u64, done: bool) {
        let mut in_flight = self.inner.in_flight.lock();
        let Some(record) = in_flight.get_mut(job_key).filter(|r| r.id == id) else {
            return;
        };
        record.attached = record.attached.saturating_sub(1);
        if record.attached == 0 && !done && self.inner.config.request.cancel_when_detached {
            tracing::debug!(job = id, "last caller detached, cancelling execution");
            record.token.cancel();
            in_flight.remove(job_key);
        }
    }
}

async fn join(handle: JoinHandle<ImageResult>) -> ImageResult {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => ImageResult::Cancelled,
        Err(e) => {
            tracing::error!(error = %e, "execution task failed");
            ImageResult::Error(Arc::new(Error::from(ErrorKind::Internal(e.to_string()))))
        },
    }
}

enum Attach {
    Ready(ImageData),
    Waiting(Attachment),
}

/// One caller's interest in an in-flight execution. Dropping it before the
/// outcome arrives detaches the caller.
struct Attachment {
    sketch: Sketch,
    job_key: String,
    id: u64,
    future: SharedResult,
    done: bool,
}

impl Attachment {
    async fn wait(&mut self) -> ImageResult {
        let result = self.future.clone().await;
        self.done = true;
        result
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.sketch.detach(&self.job_key, self.id, self.done);
    }
}

/// Removes the job's in-flight record when the job ends, panics included.
struct Record {
    sketch: Sketch,
    job_key: String,
    id: u64,
}

impl Drop for Record {
    fn drop(&mut self) {
        let mut in_flight = self.sketch.inner.in_flight.lock();
        if in_flight.get(&self.job_key).is_some_and(|r| r.id == self.id) {
            in_flight.remove(&self.job_key);
        }
    }
}

/// Delivers exactly one terminal callback to the request's listeners.
/// Dropped without [`finish`](Self::finish) means the caller went away.
struct Notifier<'a> {
    request: &'a Request,
    finished: bool,
}

impl<'a> Notifier<'a> {
    fn start(request: &'a Request) -> Self {
        request.listeners().iter().for_each(|l| l.on_start(request));
        Self { request, finished: false }
    }

    fn finish(mut self, result: &ImageResult) {
        self.finished = true;
        let request = self.request;
        for listener in request.listeners() {
            match result {
                ImageResult::Success(data) => listener.on_success(request, data),
                ImageResult::Error(err) => listener.on_error(request, err),
                ImageResult::Cancelled => listener.on_cancel(request),
            }
        }
    }
}

impl Drop for Notifier<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.request.listeners().iter().for_each(|l| l.on_cancel(self.request));
        }
    }
}

/// Handle to a request started with [`Sketch::enqueue`].
pub struct Disposable {
    token: CancellationToken,
    handle: JoinHandle<ImageResult>,
}

impl Disposable {
    /// Stop waiting for the result. The shared execution is only cancelled
    /// if nobody else is waiting for it.
    pub fn dispose(&self) {
        self.token.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled() || self.handle.is_finished()
    }

    pub async fn join(self) -> ImageResult {
        join(self.handle).await
    }
}

/// Builds a [`Sketch`].
///
/// Components are consulted in this order: those passed to
/// [`components`](Self::components), then each provider's in the order
/// added, then the built-in defaults.
pub struct SketchBuilder {
    config: Config,
    components: ComponentRegistry,
    providers: Vec<Box<dyn ComponentProvider>>,
    defaults: bool,
    download_cache: Option<DiskCache>,
    result_cache: Option<DiskCache>,
}

impl SketchBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            components: ComponentRegistry::default(),
            providers: Vec::new(),
            defaults: true,
            download_cache: None,
            result_cache: None,
        }
    }

    pub fn components(mut self, components: ComponentRegistry) -> Self {
        self.components = self.components.merged(&components);
        self
    }

    pub fn component_provider(mut self, provider: impl ComponentProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Leave out the built-in fetchers, decoders and interceptors.
    pub fn without_defaults(mut self) -> Self {
        self.defaults = false;
        self
    }

    /// Use `cache` instead of opening one from the configuration.
    pub fn download_cache(mut self, cache: DiskCache) -> Self {
        self.download_cache = Some(cache);
        self
    }

    /// Use `cache` instead of opening one from the configuration.
    pub fn result_cache(mut self, cache: DiskCache) -> Self {
        self.result_cache = Some(cache);
        self
    }

    /// Validate the configuration and open the caches. Opening disk caches
    /// blocks, so call this once at startup.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Config`] if the configuration is invalid or no cache
    /// directory can be determined.
    pub fn build(self) -> Result<Sketch> {
        let config = self.config;
        config.validate().or_raise(|| ErrorKind::Config)?;

        let mut components = self.components;
        for provider in &self.providers {
            tracing::debug!(provider = provider.name(), "registering components");
            components = components.merged(&provider.components());
        }
        if self.defaults {
            components = components.merged(&ComponentRegistry::defaults());
        }

        let download_cache = match self.download_cache {
            Some(cache) => cache,
            None if config.download_cache.enabled => {
                let directory = config.download_cache_dir().or_raise(|| ErrorKind::Config)?;
                DiskCache::open(directory, config.download_cache.max_size, config.download_cache.version)
            },
            None => DiskCache::disabled(),
        };
        let result_cache = match self.result_cache {
            Some(cache) => cache,
            None if config.result_cache.enabled => {
                let directory = config.result_cache_dir().or_raise(|| ErrorKind::Config)?;
                DiskCache::open(directory, config.result_cache.max_size, config.result_cache.version)
            },
            None => DiskCache::disabled(),
        };

        let inner = Inner {
            memory_cache: MemoryCache::new(config.memory_cache.max_size),
            dispatchers: Dispatchers::new(config.dispatch.network_parallelism, config.dispatch.decode_parallelism),
            components,
            download_cache,
            result_cache,
            pause: PauseSwitch::new(),
            in_flight: Mutex::default(),
            next_job: AtomicU64::new(0),
            config,
        };
        tracing::debug!(components = ?inner.components, "built sketch");
        Ok(Sketch { inner: Arc::new(inner) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcherFactory;

    fn config() -> Config {
        let mut config = Config::default();
        config.download_cache.enabled = false;
        config.result_cache.enabled = false;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.dispatch.decode_parallelism = 0;
        let err = Sketch::builder(config).build().err().unwrap();
        assert_eq!(*err, ErrorKind::Config);
    }

    #[test]
    fn test_user_components_come_first() {
        let memory = MemoryFetcherFactory::new();
        let sketch = Sketch::builder(config())
            .components(ComponentRegistry::builder().add_fetcher(memory).build())
            .build()
            .unwrap();
        assert_eq!(sketch.components().fetchers()[0].name(), "memory");
        assert_eq!(sketch.components().request_interceptors()[0].name(), "pause-control");
    }

    struct Extra;

    impl ComponentProvider for Extra {
        fn name(&self) -> &str {
            "extra"
        }

        fn components(&self) -> ComponentRegistry {
            ComponentRegistry::builder().add_fetcher(MemoryFetcherFactory::new()).build()
        }
    }

    #[test]
    fn test_provider_without_defaults() {
        let sketch = Sketch::builder(config()).component_provider(Extra).without_defaults().build().unwrap();
        assert_eq!(sketch.components().fetchers().len(), 1);
        assert!(sketch.components().request_interceptors().is_empty());
        assert!(!sketch.download_cache().is_available());
    }

    #[tokio::test]
    async fn test_clear_caches_without_disk() {
        let sketch = Sketch::builder(config()).build().unwrap();
        sketch.clear_caches().unwrap();
        assert_eq!(sketch.in_flight_len(), 0);
    }
}

//! In-memory fetcher for testing.

use crate::fetch::error::{ErrorKind, Result};
use crate::fetch::{BytesDataSource, DataFrom, FetchResult, Fetcher, FetcherFactory};
use crate::key;
use crate::request::Request;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Shared {
    entries: Mutex<HashMap<String, Arc<[u8]>>>,
    fetches: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

/// Serves bytes registered up front, counting every fetch.
///
/// Claims `memory://` URIs plus any URI registered with
/// [`insert`](Self::insert), so it can stand in for a network fetcher when
/// registered ahead of the defaults.
///
/// ```
/// use sketch::fetch::{DataFrom, MemoryFetcherFactory};
///
/// let fetcher = MemoryFetcherFactory::new().with_data_from(DataFrom::Network);
/// fetcher.insert("https://x/img.bmp", b"BM".to_vec());
/// assert_eq!(fetcher.total_fetches(), 0);
/// ```
#[derive(Clone)]
pub struct MemoryFetcherFactory {
    shared: Arc<Shared>,
    data_from: DataFrom,
    latency: Option<Duration>,
}

impl MemoryFetcherFactory {
    pub fn new() -> Self {
        Self { shared: Arc::default(), data_from: DataFrom::Memory, latency: None }
    }

    /// Report fetched data as coming from `data_from` instead of
    /// [`DataFrom::Memory`].
    pub fn with_data_from(mut self, data_from: DataFrom) -> Self {
        self.data_from = data_from;
        self
    }

    /// Delay every fetch, to keep executions in flight for a while.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, uri: impl AsRef<str>, data: impl Into<Arc<[u8]>>) {
        self.shared.entries.lock().insert(key::normalize_uri(uri.as_ref()), data.into());
    }

    pub fn remove(&self, uri: &str) {
        self.shared.entries.lock().remove(&key::normalize_uri(uri));
    }

    /// Fetches attempted for `uri`, including ones that failed.
    pub fn fetch_count(&self, uri: &str) -> usize {
        self.shared.fetches.lock().get(&key::normalize_uri(uri)).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.shared.total.load(Ordering::Acquire)
    }
}

impl Default for MemoryFetcherFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FetcherFactory for MemoryFetcherFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>> {
        let uri = key::normalize_uri(request.uri());
        let claimed = uri.starts_with("memory://") || self.shared.entries.lock().contains_key(&uri);
        claimed.then(|| Box::new(MemoryFetcher { factory: self.clone(), uri }) as Box<dyn Fetcher>)
    }
}

pub struct MemoryFetcher {
    factory: MemoryFetcherFactory,
    uri: String,
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    fn data_from(&self) -> DataFrom {
        self.factory.data_from
    }

    async fn fetch(&self) -> Result<FetchResult> {
        let shared = &self.factory.shared;
        *shared.fetches.lock().entry(self.uri.clone()).or_default() += 1;
        shared.total.fetch_add(1, Ordering::AcqRel);
        if let Some(latency) = self.factory.latency {
            tokio::time::sleep(latency).await;
        }
        let Some(data) = shared.entries.lock().get(&self.uri).cloned() else {
            exn::bail!(ErrorKind::NotFound(self.uri.clone()));
        };
        Ok(FetchResult::new(BytesDataSource::new(data, self.factory.data_from), None))
    }
}

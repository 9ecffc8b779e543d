//! Fetchers resolve a request's URI to a readable [`DataSource`].
//!
//! Fetchers are discovered through [`FetcherFactory`]s registered on a
//! [`ComponentRegistry`](crate::ComponentRegistry); the first factory that
//! claims a request wins. New transports are added by registering another
//! factory.

mod data_uri;
pub mod error;
mod file;
#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod memory;
mod source;

pub use self::data_uri::{DataUriFetcher, DataUriFetcherFactory};
pub use self::file::{FileFetcher, FileFetcherFactory};
#[cfg(feature = "http")]
pub use self::http::{HttpFetcher, HttpFetcherFactory};
#[cfg(any(test, feature = "mock"))]
pub use self::memory::{MemoryFetcher, MemoryFetcherFactory};
pub use self::source::{BoxAsyncRead, BoxSyncRead, BytesDataSource, DataSource, DiskCacheDataSource, FileDataSource};
use crate::fetch::error::Result;
use crate::request::{Depth, Request};
use async_trait::async_trait;
use derive_more::Display;
use std::sync::Arc;

/// Where the bytes (or the decoded image) of a result came from.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum DataFrom {
    MemoryCache,
    ResultCache,
    DownloadCache,
    LocalFile,
    /// Bytes that were already in memory, such as a `data:` URI.
    Memory,
    Network,
}

impl DataFrom {
    /// The nearest [`Depth`] that may load from here.
    pub fn depth(&self) -> Depth {
        match self {
            DataFrom::MemoryCache => Depth::Memory,
            DataFrom::ResultCache | DataFrom::DownloadCache | DataFrom::LocalFile | DataFrom::Memory => Depth::Local,
            DataFrom::Network => Depth::Network,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchResult {
    pub source: Arc<dyn DataSource>,
    /// Declared by the transport. Informational only: decoders are chosen by
    /// sniffing the bytes.
    pub mime_type: Option<String>,
}

impl FetchResult {
    pub fn new(source: impl DataSource + 'static, mime_type: Option<String>) -> Self {
        Self { source: Arc::new(source), mime_type }
    }

    pub fn data_from(&self) -> DataFrom {
        self.source.data_from()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The tier this fetcher loads from, checked against the request's
    /// [`Depth`] before [`fetch`](Self::fetch) is called.
    fn data_from(&self) -> DataFrom;

    async fn fetch(&self) -> Result<FetchResult>;
}

pub trait FetcherFactory: Send + Sync {
    /// Used for logging and diagnostics.
    fn name(&self) -> &str;

    /// A fetcher for `request`, or `None` if this factory doesn't handle its
    /// URI.
    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>>;
}

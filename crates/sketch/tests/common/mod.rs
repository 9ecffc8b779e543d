#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sketch::error::Error;
use sketch::fetch::error::{self as fetch_error, ErrorKind as FetchErrorKind};
use sketch::fetch::{
    BoxAsyncRead, BoxSyncRead, DataFrom, DataSource, FetchResult, Fetcher, FetcherFactory, MemoryFetcherFactory,
};
use sketch::{ComponentRegistry, ImageData, Listener, Request, Sketch};
use sketch_config::Config;
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub const URI: &str = "https://images.example.com/cat.bmp";

/// A 24 bit bottom-up BMP where pixel (x, y) is RGB (x, y, 7).
pub fn bmp(width: u32, height: u32) -> Vec<u8> {
    let stride = (24 * width as usize).div_ceil(32) * 4;
    let mut data = Vec::new();
    data.extend_from_slice(b"BM");
    data.extend_from_slice(&((54 + stride * height as usize) as u32).to_le_bytes());
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(&54u32.to_le_bytes());
    data.extend_from_slice(&40u32.to_le_bytes());
    data.extend_from_slice(&(width as i32).to_le_bytes());
    data.extend_from_slice(&(height as i32).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&24u16.to_le_bytes());
    data.extend_from_slice(&[0; 24]);
    for y in (0..height).rev() {
        let mut row: Vec<u8> = (0..width).flat_map(|x| [7, y as u8, x as u8]).collect();
        row.resize(stride, 0);
        data.extend_from_slice(&row);
    }
    data
}

/// A fetcher that pretends to download [`URI`].
pub fn network(latency: Option<Duration>) -> MemoryFetcherFactory {
    let fetcher = MemoryFetcherFactory::new().with_data_from(DataFrom::Network);
    let fetcher = match latency {
        Some(latency) => fetcher.with_latency(latency),
        None => fetcher,
    };
    fetcher.insert(URI, bmp(16, 16));
    fetcher
}

/// How a [`TruncatedFetcherFactory`] download ends after its first bytes.
#[derive(Clone, Copy, Debug)]
pub enum Tail {
    /// The connection drops.
    Fail,
    /// No more bytes ever arrive.
    Stall,
}

impl AsyncRead for Tail {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match *self {
            Tail::Fail => Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))),
            Tail::Stall => Poll::Pending,
        }
    }
}

#[derive(Clone, Debug)]
struct TruncatedSource {
    head: Vec<u8>,
    tail: Tail,
}

#[async_trait]
impl DataSource for TruncatedSource {
    fn data_from(&self) -> DataFrom {
        DataFrom::Network
    }

    async fn reader(&self) -> fetch_error::Result<BoxAsyncRead> {
        Ok(Box::new(Cursor::new(self.head.clone()).chain(self.tail)))
    }

    async fn sync_reader(&self) -> fetch_error::Result<BoxSyncRead> {
        exn::bail!(FetchErrorKind::Network(URI.to_string()))
    }
}

struct TruncatedFetcher(TruncatedSource);

#[async_trait]
impl Fetcher for TruncatedFetcher {
    fn data_from(&self) -> DataFrom {
        DataFrom::Network
    }

    async fn fetch(&self) -> fetch_error::Result<FetchResult> {
        Ok(FetchResult::new(self.0.clone(), None))
    }
}

/// Pretends to download [`URI`] but only ever delivers the first bytes of it.
pub struct TruncatedFetcherFactory(TruncatedSource);

impl TruncatedFetcherFactory {
    pub fn new(tail: Tail) -> Self {
        let mut head = bmp(16, 16);
        head.truncate(100);
        Self(TruncatedSource { head, tail })
    }
}

impl FetcherFactory for TruncatedFetcherFactory {
    fn name(&self) -> &str {
        "truncated"
    }

    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>> {
        (request.uri() == URI).then(|| Box::new(TruncatedFetcher(self.0.clone())) as Box<dyn Fetcher>)
    }
}

/// Disk caches live under `dir`, or are disabled without one.
pub fn config(dir: Option<&Path>) -> Config {
    let mut config = Config::default();
    match dir {
        Some(dir) => {
            config.download_cache.directory = Some(dir.join("download"));
            config.result_cache.directory = Some(dir.join("result"));
        },
        None => {
            config.download_cache.enabled = false;
            config.result_cache.enabled = false;
        },
    }
    config
}

pub fn sketch_with(config: Config, fetcher: &MemoryFetcherFactory) -> Sketch {
    Sketch::builder(config)
        .components(ComponentRegistry::builder().add_fetcher(fetcher.clone()).build())
        .build()
        .unwrap()
}

pub fn sketch(fetcher: &MemoryFetcherFactory, dir: Option<&Path>) -> Sketch {
    sketch_with(config(dir), fetcher)
}

/// Records callback names in order.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<&'static str>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }
}

impl Listener for Recorder {
    fn on_start(&self, _request: &Request) {
        self.events.lock().push("start");
    }

    fn on_success(&self, _request: &Request, _data: &ImageData) {
        self.events.lock().push("success");
    }

    fn on_error(&self, _request: &Request, _error: &Error) {
        self.events.lock().push("error");
    }

    fn on_cancel(&self, _request: &Request) {
        self.events.lock().push("cancel");
    }
}

pub fn recorder() -> Arc<Recorder> {
    Arc::new(Recorder::default())
}

use crate::fetch::error::{ErrorKind, Result};
use crate::fetch::{BytesDataSource, DataFrom, FetchResult, Fetcher, FetcherFactory};
use crate::key;
use crate::request::Request;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

/// Downloads `http` and `https` URIs.
///
/// The body is buffered in memory; the download cache interceptor persists
/// it so later requests read from disk instead.
pub struct HttpFetcher {
    client: Client,
    uri: String,
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn data_from(&self) -> DataFrom {
        DataFrom::Network
    }

    #[tracing::instrument(skip_all, fields(uri = %self.uri))]
    async fn fetch(&self) -> Result<FetchResult> {
        let response = self.client.get(&self.uri).send().await.or_raise(|| ErrorKind::Network(self.uri.clone()))?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, "unsuccessful response");
            exn::bail!(ErrorKind::Http(status.as_u16()));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase());
        let body = response.bytes().await.or_raise(|| ErrorKind::Network(self.uri.clone()))?;
        tracing::debug!(bytes = body.len(), "downloaded");
        Ok(FetchResult::new(BytesDataSource::new(body.to_vec(), DataFrom::Network), mime_type))
    }
}

#[derive(Debug, Default)]
pub struct HttpFetcherFactory {
    client: Client,
}

impl HttpFetcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, timeouts, headers).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl FetcherFactory for HttpFetcherFactory {
    fn name(&self) -> &str {
        "http"
    }

    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>> {
        matches!(key::scheme(request.uri()).as_deref(), Some("http" | "https")).then(|| {
            Box::new(HttpFetcher { client: self.client.clone(), uri: request.uri().trim().to_string() })
                as Box<dyn Fetcher>
        })
    }
}

use crate::fetch::error::{ErrorKind, Result};
use crate::fetch::{BytesDataSource, DataFrom, FetchResult, Fetcher, FetcherFactory};
use crate::key;
use crate::request::Request;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use exn::ResultExt;

/// Decodes RFC 2397 `data:` URIs, either base64 or percent-encoded.
pub struct DataUriFetcher {
    uri: String,
}

impl DataUriFetcher {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Split into the declared MIME type (if any) and the decoded payload.
    fn parse(uri: &str) -> Result<(Option<String>, Vec<u8>)> {
        let invalid = || ErrorKind::InvalidUri(truncate(uri));
        let Some((meta, payload)) = uri.trim()["data:".len()..].split_once(',') else {
            exn::bail!(invalid());
        };
        let mut params = meta.split(';');
        let mime_type = params.next().filter(|m| !m.is_empty()).map(str::to_ascii_lowercase);
        let data = if params.any(|p| p.eq_ignore_ascii_case("base64")) {
            let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let compact = urlencoding::decode(&compact).or_raise(invalid)?;
            match STANDARD.decode(compact.as_bytes()) {
                Ok(data) => data,
                Err(_) => URL_SAFE.decode(compact.as_bytes()).or_raise(invalid)?,
            }
        } else {
            urlencoding::decode_binary(payload.as_bytes()).into_owned()
        };
        Ok((mime_type, data))
    }
}

/// Keep error messages readable for multi-megabyte URIs.
fn truncate(uri: &str) -> String {
    match uri.char_indices().nth(48) {
        Some((at, _)) => format!("{}...", &uri[..at]),
        None => uri.to_string(),
    }
}

#[async_trait]
impl Fetcher for DataUriFetcher {
    fn data_from(&self) -> DataFrom {
        DataFrom::Memory
    }

    async fn fetch(&self) -> Result<FetchResult> {
        let (mime_type, data) = Self::parse(&self.uri)?;
        Ok(FetchResult::new(BytesDataSource::new(data, DataFrom::Memory), mime_type))
    }
}

#[derive(Debug, Default)]
pub struct DataUriFetcherFactory;

impl FetcherFactory for DataUriFetcherFactory {
    fn name(&self) -> &str {
        "data-uri"
    }

    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>> {
        (key::scheme(request.uri()).as_deref() == Some("data"))
            .then(|| Box::new(DataUriFetcher::new(request.uri())) as Box<dyn Fetcher>)
    }
}

use crate::fetch::error::{IoResultExt, Result};
use crate::fetch::{DataFrom, FetchResult, Fetcher, FetcherFactory, FileDataSource};
use crate::key;
use crate::request::Request;
use async_trait::async_trait;
use sketch_image::ImageFormat;
use std::path::{Path, PathBuf};

/// Loads `file://` URIs and absolute paths.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn data_from(&self) -> DataFrom {
        DataFrom::LocalFile
    }

    async fn fetch(&self) -> Result<FetchResult> {
        let target = self.path.display().to_string();
        let metadata = tokio::fs::metadata(&self.path).await.or_raise_io(&target)?;
        if !metadata.is_file() {
            exn::bail!(crate::fetch::error::ErrorKind::NotFound(target));
        }
        let mime_type = match ImageFormat::from_path(&self.path) {
            ImageFormat::Unknown => None,
            format => Some(format.mime_type().to_string()),
        };
        Ok(FetchResult::new(FileDataSource::new(&self.path), mime_type))
    }
}

#[derive(Debug, Default)]
pub struct FileFetcherFactory;

impl FileFetcherFactory {
    /// The local path for `uri`, if it names one.
    fn path(uri: &str) -> Option<PathBuf> {
        let uri = uri.trim();
        match key::scheme(uri).as_deref() {
            Some("file") => {
                let rest = &uri["file:".len()..];
                // Only the empty host (or localhost) refers to this machine.
                let path = rest.strip_prefix("//localhost").or_else(|| rest.strip_prefix("//")).unwrap_or(rest);
                let decoded = urlencoding::decode(path).ok()?;
                Some(PathBuf::from(decoded.into_owned()))
            },
            Some(_) => None,
            None => Path::new(uri).is_absolute().then(|| PathBuf::from(uri)),
        }
    }
}

impl FetcherFactory for FileFetcherFactory {
    fn name(&self) -> &str {
        "file"
    }

    fn create(&self, request: &Request) -> Option<Box<dyn Fetcher>> {
        Self::path(request.uri()).map(|path| Box::new(FileFetcher::new(path)) as Box<dyn Fetcher>)
    }
}

use crate::error::{ErrorKind, Result};
use crate::fetch::error::ErrorKind as FetchErrorKind;
use crate::fetch::{DataFrom, DiskCacheDataSource, FetchResult};
use crate::interceptor::{FetchChain, FetchInterceptor};
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

const COPY_BUFFER: usize = 64 * 1024;

/// Keeps downloaded bytes on disk.
///
/// Lookup, fetch and write happen under the download key's lock, so two
/// executions that need the same URI (at different sizes, say) download it
/// once. Only data that actually came from the network is written.
#[derive(Debug, Default)]
pub struct DownloadCacheInterceptor;

#[async_trait]
impl FetchInterceptor for DownloadCacheInterceptor {
    fn name(&self) -> &str {
        "download-cache"
    }

    fn sort_weight(&self) -> i32 {
        90
    }

    async fn intercept(&self, chain: FetchChain<'_>) -> Result<FetchResult> {
        let context = chain.context();
        let policy = chain.request().download_cache_policy();
        let cache = context.sketch().download_cache();
        if !policy.is_enabled() || !cache.is_available() {
            return chain.proceed().await;
        }
        let key = context.download_cache_key();
        let _guard = cache.lock(&key).await;
        if policy.read_enabled()
            && let Some(snapshot) = cache.open_snapshot(&key)
        {
            tracing::debug!(key = %key, "download cache hit");
            return Ok(FetchResult::new(DiskCacheDataSource::new(snapshot, DataFrom::DownloadCache), None));
        }

        let fetched = chain.proceed().await?;
        if !policy.write_enabled() || fetched.data_from() != DataFrom::Network {
            return Ok(fetched);
        }
        let Some(mut editor) = cache.open_editor(&key).await.or_raise(|| ErrorKind::DiskCache)? else {
            return Ok(fetched);
        };
        // Any early return below drops the editor, which aborts the edit.
        let mut reader = fetched.source.reader().await.map_err(ErrorKind::fetch)?;
        let mut buffer = vec![0; COPY_BUFFER];
        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    let kind = FetchErrorKind::Io(e.kind());
                    return Err(e).or_raise(|| ErrorKind::Fetch(kind));
                },
            };
            context.check_cancelled()?;
            editor.write(&buffer[..read]).await.or_raise(|| ErrorKind::DiskCache)?;
        }
        let snapshot = editor.commit_and_open_snapshot().await.or_raise(|| ErrorKind::DiskCache)?;
        tracing::debug!(key = %key, bytes = snapshot.size(), "stored in download cache");
        Ok(FetchResult {
            source: Arc::new(DiskCacheDataSource::new(snapshot, DataFrom::Network)),
            mime_type: fetched.mime_type,
        })
    }
}

use crate::decode::DecodeResult;
use crate::error::{ErrorKind, Result};
use crate::fetch::DataFrom;
use crate::interceptor::{DecodeChain, DecodeInterceptor};
use async_trait::async_trait;
use exn::ResultExt;
use sketch_disk::DiskCache;
use sketch_image::error::{ErrorKind as ImageErrorKind, Result as ImageResult};
use sketch_image::{Bitmap, ImageFormat, ImageInfo};
use std::sync::Arc;

/// Persists decoded bitmaps that differ from a plain decode (sampled or
/// transformed), so the work isn't repeated after the memory cache lets go.
///
/// Entries are a tab separated header line
/// (`width`, `height`, `format`, then transformation keys) followed by the
/// bitmap's cache blob.
#[derive(Debug, Default)]
pub struct ResultCacheInterceptor;

impl ResultCacheInterceptor {
    fn encode(result: &DecodeResult, bitmap: &Bitmap) -> Vec<u8> {
        let mut fields = vec![result.info.width.to_string(), result.info.height.to_string()];
        fields.push(result.info.format.as_str().to_string());
        fields.extend(result.transformations.iter().cloned());
        let mut blob = fields.join("\t").into_bytes();
        blob.push(b'\n');
        blob.extend_from_slice(&bitmap.to_cache_bytes());
        blob
    }

    fn decode(blob: &[u8]) -> ImageResult<DecodeResult> {
        let Some(split) = blob.iter().position(|b| *b == b'\n') else {
            exn::bail!(ImageErrorKind::InvalidData);
        };
        let header = std::str::from_utf8(&blob[..split]).or_raise(|| ImageErrorKind::InvalidData)?;
        let mut fields = header.split('\t');
        let (Some(width), Some(height), Some(format)) = (fields.next(), fields.next(), fields.next()) else {
            exn::bail!(ImageErrorKind::InvalidData);
        };
        let width = width.parse::<u32>().or_raise(|| ImageErrorKind::InvalidData)?;
        let height = height.parse::<u32>().or_raise(|| ImageErrorKind::InvalidData)?;
        let format = format.parse().unwrap_or(ImageFormat::Unknown);
        let bitmap = Bitmap::from_cache_bytes(&blob[split + 1..])?;
        let mut result = DecodeResult::new(Arc::new(bitmap), ImageInfo::new(width, height, format), DataFrom::ResultCache);
        result.transformations = fields.map(str::to_string).collect();
        Ok(result)
    }

    /// A hit, or `None` after discarding an entry that can't be read back.
    async fn read(cache: &DiskCache, key: &str) -> Option<DecodeResult> {
        let snapshot = cache.open_snapshot(key)?;
        let decoded = match snapshot.read_all().await {
            Ok(blob) => Self::decode(&blob).map_err(|e| (*e).to_string()),
            Err(e) => Err((*e).to_string()),
        };
        match decoded {
            Ok(result) => Some(result),
            Err(error) => {
                tracing::warn!(key, %error, "discarding unreadable result cache entry");
                cache.remove(key);
                None
            },
        }
    }

    async fn write(cache: &DiskCache, key: &str, result: &DecodeResult, bitmap: &Bitmap) -> Result<()> {
        let Some(mut editor) = cache.open_editor(key).await.or_raise(|| ErrorKind::DiskCache)? else {
            return Ok(());
        };
        // Dropping the editor on error aborts the edit.
        editor.write(&Self::encode(result, bitmap)).await.or_raise(|| ErrorKind::DiskCache)?;
        editor.commit().await.or_raise(|| ErrorKind::DiskCache)?;
        tracing::debug!(key, "stored in result cache");
        Ok(())
    }
}

#[async_trait]
impl DecodeInterceptor for ResultCacheInterceptor {
    fn name(&self) -> &str {
        "result-cache"
    }

    fn sort_weight(&self) -> i32 {
        -90
    }

    async fn intercept(&self, chain: DecodeChain<'_>) -> Result<DecodeResult> {
        let context = chain.context();
        let policy = chain.request().result_cache_policy();
        let cache = context.sketch().result_cache();
        if !policy.is_enabled() || !cache.is_available() {
            return chain.proceed().await;
        }
        let key = context.result_cache_key();
        let _guard = cache.lock(key).await;
        if policy.read_enabled()
            && let Some(hit) = Self::read(cache, key).await
        {
            tracing::debug!(key, "result cache hit");
            return Ok(hit);
        }
        let result = chain.proceed().await?;
        if policy.write_enabled()
            && result.is_transformed()
            && let Some(bitmap) = result.image.as_any().downcast_ref::<Bitmap>()
        {
            Self::write(cache, key, &result, bitmap).await?;
        }
        Ok(result)
    }
}

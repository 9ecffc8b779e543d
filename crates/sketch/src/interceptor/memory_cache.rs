use crate::error::Result;
use crate::interceptor::{RequestChain, RequestInterceptor};
use crate::result::ImageData;
use async_trait::async_trait;

/// Serves results from the memory cache and stores fresh ones in it.
#[derive(Debug, Default)]
pub struct MemoryCacheInterceptor;

#[async_trait]
impl RequestInterceptor for MemoryCacheInterceptor {
    fn name(&self) -> &str {
        "memory-cache"
    }

    fn sort_weight(&self) -> i32 {
        90
    }

    async fn intercept(&self, chain: RequestChain<'_>) -> Result<ImageData> {
        let context = chain.context();
        let policy = chain.request().memory_cache_policy();
        let cache = context.sketch().memory_cache();
        let key = context.cache_key();
        if policy.read_enabled()
            && let Some(lease) = cache.get(key)
        {
            tracing::debug!(key, "memory cache hit");
            return Ok(ImageData::from_lease(lease));
        }
        let data = chain.proceed().await?;
        if !policy.write_enabled() {
            return Ok(data);
        }
        let lease = cache.put(key, data.to_memory_value());
        if lease.is_none() {
            tracing::debug!(key, "image too large for the memory cache");
        }
        Ok(data.with_lease(lease))
    }
}

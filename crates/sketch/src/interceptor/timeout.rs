use crate::error::{ErrorKind, Result};
use crate::interceptor::{RequestChain, RequestInterceptor};
use crate::result::ImageData;
use async_trait::async_trait;

/// Races the rest of the chain against the request's timeout (or the
/// configured default). Losing the race drops the inner chain, which aborts
/// any open disk cache edit.
#[derive(Debug, Default)]
pub struct TimeoutInterceptor;

#[async_trait]
impl RequestInterceptor for TimeoutInterceptor {
    fn name(&self) -> &str {
        "timeout"
    }

    fn sort_weight(&self) -> i32 {
        -90
    }

    async fn intercept(&self, chain: RequestChain<'_>) -> Result<ImageData> {
        let context = chain.context();
        let timeout = chain.request().timeout().or_else(|| context.sketch().config().request_timeout());
        let Some(after) = timeout else {
            return chain.proceed().await;
        };
        match tokio::time::timeout(after, chain.proceed()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(key = context.cache_key(), ?after, "request timed out");
                exn::bail!(ErrorKind::Timeout { after })
            },
        }
    }
}

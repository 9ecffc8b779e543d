use crate::decode::DecodeResult;
use crate::error::{ErrorKind, Result};
use crate::interceptor::{DecodeChain, DecodeInterceptor};
use async_trait::async_trait;
use exn::ResultExt;
use sketch_image::Image;
use std::sync::Arc;

/// Applies the request's transformations, in order, to the decoded image on
/// the decode dispatcher.
#[derive(Debug, Default)]
pub struct TransformationInterceptor;

#[async_trait]
impl DecodeInterceptor for TransformationInterceptor {
    fn name(&self) -> &str {
        "transformation"
    }

    fn sort_weight(&self) -> i32 {
        90
    }

    async fn intercept(&self, chain: DecodeChain<'_>) -> Result<DecodeResult> {
        let context = chain.context();
        let transformations = chain.request().transformations().to_vec();
        let mut result = chain.proceed().await?;
        if transformations.is_empty() {
            return Ok(result);
        }
        let image = result.image.clone();
        let (image, applied) = context
            .sketch()
            .dispatchers()
            .decode(move || -> Result<(Arc<dyn Image>, Vec<String>)> {
                let mut image = image;
                let mut applied = Vec::new();
                for transformation in &transformations {
                    let key = transformation.key();
                    let output = transformation.transform(&image).or_raise(|| ErrorKind::Transform(key.clone()))?;
                    if let Some(output) = output {
                        image = output;
                        applied.push(key);
                    }
                }
                Ok((image, applied))
            })
            .await??;
        if !applied.is_empty() {
            tracing::debug!(key = context.cache_key(), ?applied, "transformed");
        }
        result.image = image;
        result.transformations.extend(applied);
        Ok(result)
    }
}

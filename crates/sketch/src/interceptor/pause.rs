use crate::error::{ErrorKind, Result};
use crate::interceptor::{RequestChain, RequestInterceptor};
use crate::result::ImageData;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Holds back requests that opted in with
/// [`pause_when_paused`](crate::request::RequestBuilder::pause_when_paused),
/// e.g. while a list is being flung.
#[derive(Clone, Debug)]
pub struct PauseSwitch {
    sender: Arc<watch::Sender<bool>>,
}

impl PauseSwitch {
    pub fn new() -> Self {
        Self { sender: Arc::new(watch::Sender::new(false)) }
    }

    pub fn pause(&self) {
        if !self.sender.send_replace(true) {
            tracing::debug!("paused");
        }
    }

    pub fn resume(&self) {
        if self.sender.send_replace(false) {
            tracing::debug!("resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves immediately when not paused.
    pub async fn wait_resumed(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this can't fail.
        let _ = receiver.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct PauseControlInterceptor;

#[async_trait]
impl RequestInterceptor for PauseControlInterceptor {
    fn name(&self) -> &str {
        "pause-control"
    }

    fn sort_weight(&self) -> i32 {
        -100
    }

    async fn intercept(&self, chain: RequestChain<'_>) -> Result<ImageData> {
        let context = chain.context();
        let switch = context.sketch().pause_switch();
        if chain.request().pause_when_paused() && switch.is_paused() {
            tracing::debug!(key = context.cache_key(), "waiting for resume");
            tokio::select! {
                () = context.token().cancelled() => exn::bail!(ErrorKind::Cancelled),
                () = switch.wait_resumed() => {},
            }
        }
        chain.proceed().await
    }
}

use crate::Sketch;
use crate::decode::DecodeOptions;
use crate::error::{ErrorKind, Result};
use crate::key;
use crate::request::{Request, Size};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// State for one execution of a request through the interceptor chains.
///
/// The target size is resolved once when the context is created and the
/// cache key is derived from it, so every stage sees the same key.
pub struct RequestContext {
    sketch: Sketch,
    request: Request,
    size: Option<Size>,
    cache_key: String,
    token: CancellationToken,
    extras: Mutex<HashMap<String, String>>,
}

impl RequestContext {
    pub(crate) fn resolved(
        sketch: Sketch,
        request: Request,
        size: Option<Size>,
        cache_key: String,
        token: CancellationToken,
    ) -> Self {
        Self { sketch, request, size, cache_key, token, extras: Mutex::default() }
    }

    pub fn sketch(&self) -> &Sketch {
        &self.sketch
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The resolved target size; `None` means original size.
    pub fn size(&self) -> Option<Size> {
        self.size
    }

    /// Key for the memory cache and in-flight deduplication.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Key for decoded results in the result cache.
    pub fn result_cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Key for raw bytes in the download cache.
    pub fn download_cache_key(&self) -> String {
        key::download_cache_key(&self.request)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::new(&self.request, self.size)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`ErrorKind::Cancelled`] once the execution is cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }

    /// Attach an extra to the eventual result. Interceptors use this to pass
    /// information downstream.
    pub fn insert_extra(&self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.lock().insert(key.into(), value.into());
    }

    pub fn extras(&self) -> HashMap<String, String> {
        self.extras.lock().clone()
    }
}

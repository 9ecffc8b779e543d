//! Image loading with in-flight deduplication and two-tier caching.
//!
//! A [`Request`] names a URI plus how the image should be decoded. The
//! [`Sketch`] derives a cache key from it and answers from the memory cache
//! when it can. Otherwise it runs the request through three interceptor
//! chains, deduplicating concurrent requests for the same key so the bytes
//! are fetched and decoded once:
//!
//! 1. The request chain (pause control, timeout, memory cache).
//! 2. The decode chain (result cache, transformations, then format sniffing
//!    and decoding).
//! 3. The fetch chain (download cache, then the fetcher).
//!
//! Outcomes are always an [`ImageResult`]; failures never escape as panics
//! or unhandled errors.

mod context;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod interceptor;
pub mod key;
pub mod lifecycle;
mod listener;
mod registry;
pub mod request;
mod result;
mod sketch;
pub mod transform;

pub use crate::context::RequestContext;
pub use crate::fetch::DataFrom;
pub use crate::interceptor::PauseSwitch;
pub use crate::listener::Listener;
pub use crate::registry::{ComponentProvider, ComponentRegistry, ComponentRegistryBuilder};
pub use crate::request::Request;
pub use crate::result::{ImageData, ImageResult};
pub use crate::sketch::{Disposable, Sketch, SketchBuilder};

use crate::error::Error;
use crate::request::Request;
use crate::result::ImageData;

/// Callbacks for one caller's request.
///
/// `on_start` is called once execution begins, then exactly one of the
/// terminal callbacks. All methods do nothing by default.
pub trait Listener: Send + Sync {
    fn on_start(&self, _request: &Request) {}
    fn on_success(&self, _request: &Request, _data: &ImageData) {}
    fn on_error(&self, _request: &Request, _error: &Error) {}
    fn on_cancel(&self, _request: &Request) {}
}

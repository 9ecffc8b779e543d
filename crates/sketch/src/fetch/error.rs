//! Fetch Error Types

use derive_more::{Display, Error};
use exn::ResultExt;
use std::io;

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing exists at the URI.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// The URI is malformed for the fetcher that claimed it.
    #[display("invalid uri: {_0}")]
    InvalidUri(#[error(not(source))] String),
    /// Local I/O failed; the `io::Error` is kept as a child in the error tree.
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] io::ErrorKind),
    /// Connection-level failure.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The server answered with a non-success status.
    #[display("HTTP status {_0}")]
    Http(#[error(not(source))] u16),
    /// A disk cache entry could not be read back.
    #[display("disk cache read failed")]
    DiskCache,
}

impl ErrorKind {
    pub(crate) fn from_io(err: &io::Error, target: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(target.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(target.to_string()),
            kind => Self::Io(kind),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Network(_) | Self::DiskCache => true,
            Self::Http(status) => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }
}

pub(crate) trait IoResultExt<T> {
    /// Classify an I/O failure on `target`, keeping the original error as
    /// the child.
    fn or_raise_io(self, target: &str) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn or_raise_io(self, target: &str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let kind = ErrorKind::from_io(&e, target);
                Err(e).or_raise(|| kind)
            },
        }
    }
}

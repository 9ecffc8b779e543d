//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the cache, fetch and
//! image layers are raised into an [`ErrorKind`] so the original error stays
//! attached as a child.

use crate::fetch::DataFrom;
use crate::fetch::error::{Error as FetchError, ErrorKind as FetchErrorKind};
use crate::request::Depth;
use derive_more::{Display, Error};
use std::time::Duration;

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Configuration problems (no fetcher, no decoder, depth) are final for the
/// request. Transient problems are worth a new request later; nothing in the
/// pipeline retries on its own.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No registered fetcher understands the URI scheme.
    #[display("no fetcher for uri scheme {_0:?}")]
    NoFetcher(#[error(not(source))] String),
    /// Nothing can decode the fetched bytes (value is the sniffed MIME type).
    #[display("no decoder for {_0}")]
    NoDecoder(#[error(not(source))] String),
    /// The request's depth doesn't allow loading from where the data lives.
    #[display("request depth {depth} does not allow loading from {from}")]
    Depth { depth: Depth, from: DataFrom },
    /// Fetching the bytes failed.
    #[display("fetch failed: {_0}")]
    Fetch(FetchErrorKind),
    /// Reading from or writing to a disk cache failed.
    #[display("disk cache error")]
    DiskCache,
    /// The request did not complete within its timeout.
    #[display("timed out after {after:?}")]
    Timeout { after: Duration },
    /// The bytes were recognised but could not be decoded.
    #[display("decode failed")]
    Decode,
    /// A transformation failed (value is the transformation key).
    #[display("transformation {_0} failed")]
    Transform(#[error(not(source))] String),
    /// The execution was cancelled. Never delivered as an error outcome.
    #[display("cancelled")]
    Cancelled,
    /// The configuration passed to the builder is invalid.
    #[display("invalid configuration")]
    Config,
    /// A task panicked or could not be joined.
    #[display("internal error: {_0}")]
    Internal(#[error(not(source))] String),
}

impl ErrorKind {
    /// Convert a fetch error, keeping the fetch layer's error tree as a
    /// child.
    #[track_caller]
    pub fn fetch(err: FetchError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Fetch(inner))
    }

    /// Returns `true` if issuing the request again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(kind) => kind.is_retryable(),
            Self::DiskCache | Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NoFetcher("ftp".to_string()), false)]
    #[case(ErrorKind::NoDecoder("application/octet-stream".to_string()), false)]
    #[case(ErrorKind::Depth { depth: Depth::Local, from: DataFrom::Network }, false)]
    #[case(ErrorKind::Fetch(FetchErrorKind::Network("https://x/a.png".to_string())), true)]
    #[case(ErrorKind::Fetch(FetchErrorKind::NotFound("/a.png".to_string())), false)]
    #[case(ErrorKind::DiskCache, true)]
    #[case(ErrorKind::Timeout { after: Duration::from_secs(1) }, true)]
    #[case(ErrorKind::Decode, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::Depth { depth: Depth::Memory, from: DataFrom::LocalFile };
        assert_eq!(kind.to_string(), "request depth Memory does not allow loading from LocalFile");
        assert_eq!(ErrorKind::NoFetcher("ftp".to_string()).to_string(), "no fetcher for uri scheme \"ftp\"");
    }
}

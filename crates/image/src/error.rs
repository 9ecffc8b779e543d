//! Image Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An image error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data is corrupt or malformed. Don't retry with the same input.
    #[display("invalid or corrupted data")]
    InvalidData,
    /// The requested format is not supported.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The format is recognised, but this particular variant of it (bit
    /// depth, compression method, etc.) cannot be decoded.
    #[display("unsupported layout: {_0}")]
    UnsupportedLayout(#[error(not(source))] String),
    /// Pixel buffer does not match the declared dimensions.
    #[display("pixel buffer of {actual} bytes does not match expected {expected} bytes")]
    BufferSize { expected: usize, actual: usize },
    /// An I/O operation failed while reading image data.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

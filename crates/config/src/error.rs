//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A layer (file or environment) could not be read or deserialized.
    #[display("could not load configuration")]
    Load,
    /// The configuration file extension is not one of toml, yaml, yml or json.
    #[display("unsupported configuration file: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Values were parsed but don't make sense together.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No directory was configured and the platform has no cache directory.
    #[display("no cache directory available")]
    NoCacheDirectory,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive structure is broken. Don't retry with the same bytes.
    #[display("malformed archive: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The archive uses a feature this reader deliberately does not handle
    /// (Zip64, encryption, multi-disk, exotic compression methods).
    #[display("unsupported archive feature: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// An entry (or the archive itself) is bigger than the caller allows.
    #[display("{name} is too large: {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge {
        name: String,
        size: u64,
        limit: u64,
    },
    /// Decompressed contents don't match the recorded CRC-32 or size.
    #[display("checksum mismatch for {_0}")]
    Checksum(#[error(not(source))] String),
    /// No entry exists at the requested path.
    #[display("entry not found: {_0}")]
    NotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Archives are held in memory; the same bytes give the same answer.
        false
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

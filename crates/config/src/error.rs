use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("config file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("unsupported config file format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    #[display("failed to load configuration")]
    Load,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Configuration needs a human to fix it.
        false
    }
}

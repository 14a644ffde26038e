//! Ingest Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Every [`ErrorKind`] maps onto exactly one
//! [`StatusCode`]; the orchestrator is the only place that performs the
//! mapping.

use std::fmt::{Display, Formatter, Result as FmtResult};

use derive_more::{Display, Error};
use exn::Frame;

use crate::status::StatusCode;

/// An ingest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid module path: {_0}")]
    BadModulePath(#[error(not(source))] String),
    #[display("invalid version: {_0}")]
    BadVersion(#[error(not(source))] String),
    #[display("excluded: {_0}")]
    Excluded(#[error(not(source))] String),
    #[display("not found upstream: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("gone upstream: {_0}")]
    Gone(#[error(not(source))] String),
    /// The archive is corrupt or laid out in a way the pipeline refuses.
    #[display("invalid archive: {_0}")]
    InvalidArchive(#[error(not(source))] String),
    #[display("no packages found under any build context")]
    NoPackages,
    #[display("go.mod declares {canonical}, not {requested}")]
    AlternativeModule { requested: String, canonical: String },
    #[display("module too large: {_0}")]
    TooLarge(#[error(not(source))] String),
    /// The proxy failed in a way that might not happen next time.
    #[display("proxy error: {_0}")]
    Proxy(#[error(not(source))] String),
    #[display("fetch timed out")]
    Timeout,
    #[display("persistence error")]
    Persistence,
    /// A bug: a panic, or a broken invariant.
    #[display("internal error: {_0}")]
    Internal(#[error(not(source))] String),
    #[display("unknown status code {_0}")]
    UnknownStatus(#[error(not(source))] u16),
}

impl ErrorKind {
    /// Status recorded for a fetch that failed with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadModulePath(_) | Self::BadVersion(_) => StatusCode::BadRequest,
            Self::Excluded(_) => StatusCode::Excluded,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Gone(_) => StatusCode::Gone,
            Self::InvalidArchive(_) | Self::NoPackages => StatusCode::NotAcceptable,
            Self::AlternativeModule { .. } => StatusCode::AlternativeModule,
            Self::TooLarge(_) => StatusCode::TooLarge,
            Self::Proxy(_) => StatusCode::BadGateway,
            Self::Timeout => StatusCode::Timeout,
            Self::Persistence | Self::Internal(_) | Self::UnknownStatus(_) => StatusCode::Internal,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        self.status().is_retryable()
    }

    pub(crate) fn invalid_archive(reason: impl Into<String>) -> Self {
        Self::InvalidArchive(reason.into())
    }

    pub(crate) fn too_large(reason: impl Into<String>) -> Self {
        Self::TooLarge(reason.into())
    }
}

/// The step of a fetch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    #[display("validate")]
    Validate,
    #[display("resolve version")]
    ResolveVersion,
    #[display("download archive")]
    DownloadArchive,
    #[display("process contents")]
    ProcessContents,
    #[display("persist")]
    Persist,
}

/// A failed fetch, with the identity and step it failed at.
#[derive(Debug)]
pub struct FetchError {
    pub module_path: String,
    pub version: String,
    pub phase: Phase,
    pub error: Error,
}

impl FetchError {
    pub fn new(module_path: &str, version: &str, phase: Phase, error: Error) -> Self {
        Self { module_path: module_path.to_string(), version: version.to_string(), phase, error }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error
    }

    pub fn status(&self) -> StatusCode {
        self.error.status()
    }

    /// The error and its first chain of causes on one line, for storage.
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        let mut frame: Option<&Frame> = Some(self.error.frame());
        while let Some(current) = frame {
            parts.push(current.error().to_string());
            frame = current.children().first();
        }
        parts.dedup();
        parts.join(": ")
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@{}: {}: {}", self.module_path, self.version, self.phase, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::BadVersion("x".to_string()), StatusCode::BadRequest)]
    #[case(ErrorKind::Gone("x".to_string()), StatusCode::Gone)]
    #[case(ErrorKind::NoPackages, StatusCode::NotAcceptable)]
    #[case(ErrorKind::too_large("x"), StatusCode::TooLarge)]
    #[case(ErrorKind::Proxy("x".to_string()), StatusCode::BadGateway)]
    #[case(ErrorKind::Persistence, StatusCode::Internal)]
    fn kinds_map_to_statuses(#[case] kind: ErrorKind, #[case] status: StatusCode) {
        assert_eq!(kind.status(), status);
    }

    #[test]
    fn message_includes_causes() {
        let inner: std::result::Result<(), Error> =
            Err(exn::Exn::from(ErrorKind::Internal("disk on fire".to_string())));
        let error = inner.or_raise(|| ErrorKind::Persistence).unwrap_err();
        let err = FetchError::new("github.com/my/module", "v1.0.0", Phase::Persist, error);
        assert_eq!(err.message(), "persistence error: internal error: disk on fire");
        assert_eq!(
            err.to_string(),
            "github.com/my/module@v1.0.0: persist: persistence error: internal error: disk on fire"
        );
    }
}

//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source file could not be tokenized or its header parsed.
    #[display("syntax error in {file}: {reason}")]
    Syntax { file: String, reason: String },
    /// The files of one directory disagree about the package name.
    #[display("multiple packages in one directory: {}", _0.join(", "))]
    MultiplePackages(#[error(not(source))] Vec<String>),
    /// A `//go:build` or `// +build` line could not be parsed.
    #[display("invalid build constraint: {_0}")]
    InvalidConstraint(#[error(not(source))] String),
    /// The `go.mod` file is missing a module directive or is otherwise broken.
    #[display("invalid go.mod: {_0}")]
    InvalidGoMod(#[error(not(source))] String),
    #[display("invalid module path: {_0}")]
    InvalidModulePath(#[error(not(source))] String),
    #[display("invalid version: {_0}")]
    InvalidVersion(#[error(not(source))] String),
    /// A value could not be parsed into one of this crate's types.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError { field: &'static str, value: String },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Source is either valid or it's not.
        false
    }

    /// Returns `true` for failures that only affect the one directory being
    /// loaded, rather than the module as a whole.
    pub fn is_bad_package(&self) -> bool {
        matches!(self, Self::Syntax { .. } | Self::MultiplePackages(_) | Self::InvalidConstraint(_))
    }

    pub(crate) fn syntax(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Syntax { file: file.into(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::MultiplePackages(vec!["foo".to_string(), "bar".to_string()]).to_string(),
            "multiple packages in one directory: foo, bar"
        );
        assert_eq!(
            ErrorKind::syntax("a.go", "unterminated string").to_string(),
            "syntax error in a.go: unterminated string"
        );
    }

    #[test]
    fn bad_package_classification() {
        assert!(ErrorKind::syntax("a.go", "x").is_bad_package());
        assert!(!ErrorKind::InvalidGoMod("x".to_string()).is_bad_package());
    }
}

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{Error, ErrorKind};

/// Outcome of one fetch, as stored in version state.
///
/// Codes below 500 are terminal: retrying the same version will give the same
/// answer. Codes from 500 up are retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    /// Stored, but some directories could not be turned into packages.
    Incomplete = 290,
    BadRequest = 400,
    Excluded = 403,
    NotFound = 404,
    Gone = 410,
    /// Invalid archive, or no packages in it.
    NotAcceptable = 490,
    /// The `go.mod` declares a different module path.
    AlternativeModule = 491,
    /// A package, import or directory ceiling was exceeded.
    TooLarge = 492,
    Internal = 500,
    BadGateway = 502,
    Timeout = 504,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Incomplete)
    }

    pub fn is_terminal(self) -> bool {
        self.as_u16() < 500
    }

    pub fn is_retryable(self) -> bool {
        !self.is_terminal()
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Incomplete => "incomplete packages",
            Self::BadRequest => "bad request",
            Self::Excluded => "excluded",
            Self::NotFound => "not found",
            Self::Gone => "gone",
            Self::NotAcceptable => "not acceptable",
            Self::AlternativeModule => "alternative module",
            Self::TooLarge => "module too large",
            Self::Internal => "internal error",
            Self::BadGateway => "bad gateway",
            Self::Timeout => "timeout",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            200 => Self::Ok,
            290 => Self::Incomplete,
            400 => Self::BadRequest,
            403 => Self::Excluded,
            404 => Self::NotFound,
            410 => Self::Gone,
            490 => Self::NotAcceptable,
            491 => Self::AlternativeModule,
            492 => Self::TooLarge,
            500 => Self::Internal,
            502 => Self::BadGateway,
            504 => Self::Timeout,
            other => exn::bail!(ErrorKind::UnknownStatus(other)),
        })
    }
}

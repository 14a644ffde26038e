use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use exn::ResultExt;

use crate::consts::{PSEUDO_VERSION_REGEX, REPOSITORY_HOST_REGEX, STD_MODULE};
use crate::error::{Error, ErrorKind, Result};

/// Classification of a version string, derived purely from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionKind {
    Release,
    Prerelease,
    /// A generated version identifying a specific commit.
    Pseudo,
}

impl VersionKind {
    /// Classify a canonical `vMAJOR.MINOR.PATCH[-pre][+build]` version.
    pub fn of(version: &str) -> Result<Self> {
        let parsed = parse(version)?;
        Ok(if PSEUDO_VERSION_REGEX.is_match(version) {
            Self::Pseudo
        } else if !parsed.pre.is_empty() {
            Self::Prerelease
        } else {
            Self::Release
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Prerelease => "prerelease",
            Self::Pseudo => "pseudo",
        }
    }
}

impl Display for VersionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionKind {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "release" => Self::Release,
            "prerelease" => Self::Prerelease,
            "pseudo" => Self::Pseudo,
            other => exn::bail!(ErrorKind::ParseError { field: "version_kind", value: other.to_string() }),
        })
    }
}

impl TryFrom<String> for VersionKind {
    type Error = Error;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

/// Parse a `v`-prefixed semantic version.
pub fn parse(version: &str) -> Result<semver::Version> {
    let Some(bare) = version.strip_prefix('v') else {
        exn::bail!(ErrorKind::InvalidVersion(version.to_string()));
    };
    semver::Version::parse(bare).or_raise(|| ErrorKind::InvalidVersion(version.to_string()))
}

/// Compare two versions by semantic version precedence (build metadata is
/// ignored).
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse(a)?.cmp_precedence(&parse(b)?))
}

/// Validate a module path.
///
/// The path must be non-empty, made of `/`-separated elements of letters,
/// digits and `-._~+`, with no empty, `.` or `..` elements and no element
/// starting or ending with a dot. The first element must look like a host
/// name (contain a dot and not start with `-`), except for the standard
/// library module.
pub fn check_module_path(path: &str) -> Result<()> {
    let invalid = || ErrorKind::InvalidModulePath(path.to_string());
    if path == STD_MODULE {
        return Ok(());
    }
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        exn::bail!(invalid());
    }
    for element in path.split('/') {
        let allowed = element.chars().all(|c| c.is_ascii_alphanumeric() || "-._~+".contains(c));
        if element.is_empty() || !allowed || element.starts_with('.') || element.ends_with('.') {
            exn::bail!(invalid());
        }
    }
    let host = path.split('/').next().unwrap_or_default();
    if !host.contains('.') || host.starts_with('-') {
        exn::bail!(invalid());
    }
    Ok(())
}

/// Browsable repository URL for modules hosted on well-known forges.
pub fn repository_url(module_path: &str) -> Option<String> {
    let captures = REPOSITORY_HOST_REGEX.captures(module_path)?;
    Some(format!("https://{}/{}/{}", &captures[1], &captures[2], &captures[3]))
}

//! Module proxy clients.
//!
//! A module proxy answers three questions about a module: what a version's
//! canonical name and commit time are (`.info`), what the latest version is
//! (`@latest`), and what the version's source is (`.zip`).

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpProxy;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockProxy;
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcDateTime};

use crate::error::{ErrorKind, Result};

/// Canonical version and commit time, as reported by a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub time: UtcDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVersionInfo {
    version: String,
    time: String,
}

impl VersionInfo {
    pub fn new(version: impl Into<String>, time: UtcDateTime) -> Self {
        Self { version: version.into(), time }
    }

    /// Parse the JSON body of a `.info` or `@latest` response.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawVersionInfo =
            serde_json::from_slice(body).or_raise(|| ErrorKind::Proxy("malformed version info".to_string()))?;
        let time = OffsetDateTime::parse(&raw.time, &Rfc3339)
            .or_raise(|| ErrorKind::Proxy(format!("malformed commit time {:?}", raw.time)))?
            .to_utc();
        Ok(Self { version: raw.version, time })
    }
}

/// Read access to a module proxy.
///
/// Implementations must report a missing module or version as
/// [`ErrorKind::NotFound`] and a removed one as [`ErrorKind::Gone`]; every
/// other failure is [`ErrorKind::Proxy`].
#[async_trait]
pub trait ProxyClient: Send + Sync {
    /// Resolve `version` of `module_path` to its canonical form.
    async fn info(&self, module_path: &str, version: &str) -> Result<VersionInfo>;

    /// Resolve the latest version of `module_path`.
    async fn latest(&self, module_path: &str) -> Result<VersionInfo>;

    /// Download the zip archive of a version.
    async fn archive(&self, module_path: &str, version: &str) -> Result<Vec<u8>>;
}

/// Escape a module path or version for use in a proxy URL.
///
/// Proxies are served from case-insensitive file systems, so every upper-case
/// letter is written as `!` followed by its lower-case form.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

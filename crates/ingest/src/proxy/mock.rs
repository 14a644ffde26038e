//! In-memory module proxy for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::UtcDateTime;
use tokio::sync::RwLock;

use super::{ProxyClient, VersionInfo};
use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone)]
enum Entry {
    Available { time: UtcDateTime, archive: Vec<u8> },
    Gone,
    Failing(String),
}

/// In-memory proxy.
///
/// Versions live in a `HashMap` behind a [`RwLock`], so tests can add,
/// take down or break versions while fetches are running against it.
#[derive(Debug, Default)]
pub struct MockProxy {
    versions: RwLock<HashMap<(String, String), Entry>>,
    delay: Option<Duration>,
    archive_requests: AtomicUsize,
}

impl MockProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the proxy with `(module, version, archive)` triples,
    /// all committed at `time`.
    pub fn with_versions<'a>(
        time: UtcDateTime,
        versions: impl IntoIterator<Item = (&'a str, &'a str, Vec<u8>)>,
    ) -> Self {
        let map = versions
            .into_iter()
            .map(|(module, version, archive)| {
                ((module.to_string(), version.to_string()), Entry::Available { time, archive })
            })
            .collect();
        Self { versions: RwLock::new(map), ..Self::default() }
    }

    /// Make every archive download wait for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn insert(&self, module_path: &str, version: &str, time: UtcDateTime, archive: Vec<u8>) {
        self.versions.write().await.insert(key(module_path, version), Entry::Available { time, archive });
    }

    /// Answer 410 for this version from now on.
    pub async fn take_down(&self, module_path: &str, version: &str) {
        self.versions.write().await.insert(key(module_path, version), Entry::Gone);
    }

    /// Answer with a transient proxy error for this version from now on.
    pub async fn fail(&self, module_path: &str, version: &str, reason: &str) {
        self.versions.write().await.insert(key(module_path, version), Entry::Failing(reason.to_string()));
    }

    /// How many archives have been requested so far.
    pub fn archive_requests(&self) -> usize {
        self.archive_requests.load(Ordering::SeqCst)
    }

    async fn entry(&self, module_path: &str, version: &str) -> Result<(UtcDateTime, Vec<u8>)> {
        let what = format!("{module_path}@{version}");
        match self.versions.read().await.get(&key(module_path, version)) {
            Some(Entry::Available { time, archive }) => Ok((*time, archive.clone())),
            Some(Entry::Gone) => exn::bail!(ErrorKind::Gone(what)),
            Some(Entry::Failing(reason)) => exn::bail!(ErrorKind::Proxy(reason.clone())),
            None => exn::bail!(ErrorKind::NotFound(what)),
        }
    }
}

fn key(module_path: &str, version: &str) -> (String, String) {
    (module_path.to_string(), version.to_string())
}

#[async_trait]
impl ProxyClient for MockProxy {
    async fn info(&self, module_path: &str, version: &str) -> Result<VersionInfo> {
        let (time, _) = self.entry(module_path, version).await?;
        Ok(VersionInfo::new(version, time))
    }

    async fn latest(&self, module_path: &str) -> Result<VersionInfo> {
        let versions = self.versions.read().await;
        let latest = versions
            .iter()
            .filter_map(|((module, version), entry)| match entry {
                Entry::Available { time, .. } if module == module_path => Some((version, *time)),
                _ => None,
            })
            .max_by(|(a, _), (b, _)| modfetch_extract::compare_versions(a, b).unwrap_or_else(|_| a.cmp(b)));
        match latest {
            Some((version, time)) => Ok(VersionInfo::new(version.clone(), time)),
            None => exn::bail!(ErrorKind::NotFound(module_path.to_string())),
        }
    }

    async fn archive(&self, module_path: &str, version: &str) -> Result<Vec<u8>> {
        self.archive_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (_, archive) = self.entry(module_path, version).await?;
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinguishes_missing_from_gone() {
        let proxy = MockProxy::with_versions(UtcDateTime::UNIX_EPOCH, [("example.com/a", "v1.0.0", Vec::new())]);
        assert!(proxy.info("example.com/a", "v1.0.0").await.is_ok());
        let err = proxy.info("example.com/a", "v2.0.0").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        proxy.take_down("example.com/a", "v1.0.0").await;
        let err = proxy.archive("example.com/a", "v1.0.0").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Gone(_)));
    }

    #[tokio::test]
    async fn latest_uses_version_precedence() {
        let proxy = MockProxy::with_versions(
            UtcDateTime::UNIX_EPOCH,
            [
                ("example.com/a", "v1.9.0", Vec::new()),
                ("example.com/a", "v1.10.0", Vec::new()),
                ("example.com/b", "v9.0.0", Vec::new()),
            ],
        );
        assert_eq!(proxy.latest("example.com/a").await.unwrap().version, "v1.10.0");
        assert!(proxy.latest("example.com/c").await.is_err());
    }
}

//! Fetching one module version, end to end.
//!
//! [`Fetcher::fetch_and_update_state`] is the only place that turns errors
//! into status codes. Whatever happens in between, the last thing it does is
//! record the outcome in the version's state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use exn::ResultExt;
use modfetch_archive::ModuleArchive;
use modfetch_cache::VersionStateUpdate;
use modfetch_config::{ExclusionsConfig, Limits};
use modfetch_extract::models::{ModuleVersion, Package, Readme};
use modfetch_extract::{GoMod, VersionKind, check_module_path, parse_go_mod, parse_version, repository_url};
use modfetch_license::{License, Matcher, detect, is_redistributable};
use time::UtcDateTime;
use tokio::task::JoinError;
use tracing::instrument;

use crate::error::{Error, ErrorKind, FetchError, Phase, Result};
use crate::persist::Persistence;
use crate::process::extract_packages_until;
use crate::proxy::{ProxyClient, VersionInfo};
use crate::status::StatusCode;

/// Version query resolved through the proxy's `@latest` endpoint.
pub const LATEST: &str = "latest";

/// Module paths and versions that must never be fetched.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    prefixes: Vec<String>,
    versions: HashSet<(String, String)>,
}

impl Exclusions {
    /// `versions` are `module@version` pairs; anything without an `@` is
    /// ignored.
    pub fn new<P, V>(prefixes: P, versions: V) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        let prefixes = prefixes.into_iter().map(|p| p.into().trim_end_matches('/').to_string()).collect();
        let versions = versions
            .into_iter()
            .filter_map(|pair| {
                let (module, version) = pair.as_ref().rsplit_once('@')?;
                Some((module.to_string(), version.to_string()))
            })
            .collect();
        Self { prefixes, versions }
    }

    /// Returns `true` if `module_path` is excluded as a whole, or `version` of
    /// it is.
    pub fn is_excluded(&self, module_path: &str, version: &str) -> bool {
        let prefixed = self.prefixes.iter().any(|prefix| {
            module_path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        });
        prefixed || self.versions.contains(&(module_path.to_string(), version.to_string()))
    }
}

impl From<&ExclusionsConfig> for Exclusions {
    fn from(config: &ExclusionsConfig) -> Self {
        Self::new(config.prefixes.iter().cloned(), &config.versions)
    }
}

/// Everything derived from an archive, before it is stored.
#[derive(Debug)]
struct Processed {
    go_mod: Option<GoMod>,
    readme: Option<Readme>,
    licenses: Vec<License>,
    packages: Vec<Package>,
    incomplete: bool,
    redistributable: bool,
}

/// A successful fetch, before its state is recorded.
struct Fetched {
    version: String,
    commit_time: UtcDateTime,
    status: StatusCode,
    go_mod_path: Option<String>,
}

/// A failed fetch, with whatever was learned before it failed.
struct Failed {
    version: String,
    commit_time: Option<UtcDateTime>,
    error: FetchError,
}

impl Failed {
    fn at(
        module_path: &str,
        version: &str,
        commit_time: Option<UtcDateTime>,
        phase: Phase,
    ) -> impl FnOnce(Error) -> Self {
        let module_path = module_path.to_string();
        let version = version.to_string();
        move |error| Self { error: FetchError::new(&module_path, &version, phase, error), version, commit_time }
    }
}

/// Drives a single module version from the proxy into persistence.
#[derive(Clone)]
pub struct Fetcher {
    proxy: Arc<dyn ProxyClient>,
    persistence: Arc<dyn Persistence>,
    exclusions: Arc<Exclusions>,
    limits: Limits,
}

impl Fetcher {
    pub fn new(
        proxy: Arc<dyn ProxyClient>,
        persistence: Arc<dyn Persistence>,
        exclusions: Exclusions,
        limits: Limits,
    ) -> Self {
        Self { proxy, persistence, exclusions: Arc::new(exclusions), limits }
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Fetch `module_path@version`, store the result and record the outcome.
    ///
    /// Never fails: every problem is folded into the returned status, and the
    /// error (if any) is returned alongside it after being recorded.
    #[instrument(skip(self))]
    pub async fn fetch_and_update_state(&self, module_path: &str, version: &str) -> (StatusCode, Option<FetchError>) {
        let (resolved, commit_time, status, go_mod_path, error) = match self.fetch(module_path, version).await {
            Ok(fetched) => (fetched.version, Some(fetched.commit_time), fetched.status, fetched.go_mod_path, None),
            Err(failed) => {
                let status = failed.error.status();
                let go_mod_path = match failed.error.kind() {
                    ErrorKind::AlternativeModule { canonical, .. } => Some(canonical.clone()),
                    _ => None,
                };
                (failed.version, failed.commit_time, status, go_mod_path, Some(failed.error))
            },
        };

        let (status, error) = match self.compensate(module_path, &resolved, status, go_mod_path.as_deref()).await {
            Ok(()) => (status, error),
            Err(err) => (StatusCode::Internal, Some(FetchError::new(module_path, &resolved, Phase::Persist, err))),
        };

        let update = VersionStateUpdate {
            module_path: module_path.to_string(),
            version: resolved.clone(),
            timestamp: commit_time.unwrap_or_else(UtcDateTime::now),
            status: status.as_u16(),
            error: error.as_ref().map(FetchError::message),
            go_mod_path,
        };
        if let Err(err) = self.persistence.upsert_version_state(&update).await {
            tracing::error!(error = ?err, "could not record version state");
            return (StatusCode::Internal, Some(FetchError::new(module_path, &resolved, Phase::Persist, err)));
        }

        match &error {
            None => tracing::info!(version = %resolved, %status, "fetched module version"),
            Some(err) if status.is_retryable() => {
                tracing::warn!(version = %resolved, %status, error = %err, "fetch failed");
            },
            Some(err) => tracing::info!(version = %resolved, %status, error = %err, "fetch rejected"),
        }
        (status, error)
    }

    /// Record that a fetch ran out of time. Used by callers that abandon
    /// [`fetch_and_update_state`](Self::fetch_and_update_state) mid-flight.
    #[instrument(skip(self))]
    pub async fn record_timeout(&self, module_path: &str, version: &str) -> Result<()> {
        let update = VersionStateUpdate {
            module_path: module_path.to_string(),
            version: version.to_string(),
            timestamp: UtcDateTime::now(),
            status: StatusCode::Timeout.as_u16(),
            error: Some(ErrorKind::Timeout.to_string()),
            go_mod_path: None,
        };
        self.persistence.upsert_version_state(&update).await
    }

    /// Compensating writes for statuses that change what is already stored.
    async fn compensate(
        &self,
        module_path: &str,
        version: &str,
        status: StatusCode,
        go_mod_path: Option<&str>,
    ) -> Result<()> {
        match (status, go_mod_path) {
            (StatusCode::NotFound | StatusCode::Gone, _) => {
                if self.persistence.delete_module_version(module_path, version).await? {
                    tracing::info!(module_path, version, "deleted module version that is no longer available");
                }
            },
            (StatusCode::AlternativeModule, Some(canonical)) => {
                self.persistence.record_alternative_module_path(module_path, canonical).await?;
                let deleted = self.persistence.delete_search_documents(module_path, version).await?;
                tracing::debug!(module_path, canonical, deleted, "recorded alternative module path");
            },
            _ => {},
        }
        Ok(())
    }

    async fn fetch(&self, module_path: &str, version: &str) -> std::result::Result<Fetched, Failed> {
        self.validate(module_path, version).map_err(Failed::at(module_path, version, None, Phase::Validate))?;
        let info = self
            .resolve(module_path, version)
            .await
            .map_err(Failed::at(module_path, version, None, Phase::ResolveVersion))?;
        let version = info.version.as_str();
        let commit_time = Some(info.time);
        let fail = |phase| Failed::at(module_path, version, commit_time, phase);
        if self.exclusions.is_excluded(module_path, version) {
            let excluded = ErrorKind::Excluded(format!("{module_path}@{version}"));
            return Err(fail(Phase::ResolveVersion)(exn::Exn::from(excluded)));
        }

        let data = self
            .proxy
            .archive(module_path, version)
            .await
            .map_err(fail(Phase::DownloadArchive))?;
        let archive_hash = blake3::hash(&data).to_hex().to_string();
        let processed =
            self.process(module_path, version, data).await.map_err(fail(Phase::ProcessContents))?;

        let status = if processed.incomplete { StatusCode::Incomplete } else { StatusCode::Ok };
        let go_mod_path = processed.go_mod.as_ref().map(|go_mod| go_mod.module_path.clone());
        let module = ModuleVersion {
            module_path: module_path.to_string(),
            version: version.to_string(),
            commit_time: info.time,
            version_kind: VersionKind::of(version)
                .or_raise(|| ErrorKind::BadVersion(version.to_string()))
                .map_err(fail(Phase::Persist))?,
            readme: processed.readme,
            repository_url: repository_url(module_path),
            has_go_mod: processed.go_mod.is_some(),
            go_mod_path: go_mod_path.clone(),
            deprecated: processed.go_mod.as_ref().and_then(|go_mod| go_mod.deprecated.clone()),
            retracted: processed.go_mod.as_ref().is_some_and(|go_mod| go_mod.is_retracted(version)),
            incomplete: processed.incomplete,
            redistributable: processed.redistributable,
            archive_hash,
        };
        self.persistence
            .insert_module_version(&module, &processed.packages, &processed.licenses)
            .await
            .map_err(fail(Phase::Persist))?;

        Ok(Fetched { version: version.to_string(), commit_time: info.time, status, go_mod_path })
    }

    fn validate(&self, module_path: &str, version: &str) -> Result<()> {
        check_module_path(module_path).or_raise(|| ErrorKind::BadModulePath(module_path.to_string()))?;
        if version != LATEST {
            parse_version(version).or_raise(|| ErrorKind::BadVersion(version.to_string()))?;
        }
        if self.exclusions.is_excluded(module_path, version) {
            exn::bail!(ErrorKind::Excluded(format!("{module_path}@{version}")));
        }
        Ok(())
    }

    async fn resolve(&self, module_path: &str, version: &str) -> Result<VersionInfo> {
        let info = match version {
            LATEST => self.proxy.latest(module_path).await?,
            _ => self.proxy.info(module_path, version).await?,
        };
        if parse_version(&info.version).is_err() {
            exn::bail!(ErrorKind::Proxy(format!("proxy resolved {module_path}@{version} to {:?}", info.version)));
        }
        Ok(info)
    }

    /// Parse the archive and extract everything from it on a blocking thread.
    async fn process(&self, module_path: &str, version: &str, data: Vec<u8>) -> Result<Processed> {
        let module_path = module_path.to_string();
        let version = version.to_string();
        let limits = self.limits.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(cancelled.clone());
        run_blocking(move || process_archive(data, &module_path, &version, &limits, &cancelled)).await
    }
}

/// Tells blocking work to stop once the future waiting on it is dropped,
/// e.g. when a fetch times out. The blocking thread keeps running until the
/// work next checks the flag.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Run CPU-bound work on the blocking pool, turning a panic into an error.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(join_error)?
}

fn join_error(err: JoinError) -> Error {
    let reason = match err.try_into_panic() {
        Ok(payload) => match (payload.downcast_ref::<&str>(), payload.downcast_ref::<String>()) {
            (Some(message), _) => format!("panic: {message}"),
            (_, Some(message)) => format!("panic: {message}"),
            _ => "panic".to_string(),
        },
        Err(_) => "processing task was cancelled".to_string(),
    };
    exn::Exn::from(ErrorKind::Internal(reason))
}

fn process_archive(
    data: Vec<u8>,
    module_path: &str,
    version: &str,
    limits: &Limits,
    cancelled: &AtomicBool,
) -> Result<Processed> {
    let archive = ModuleArchive::from_bytes(data, module_path, version)
        .or_raise(|| ErrorKind::invalid_archive("could not open zip"))?;

    let go_mod = match archive.file("go.mod") {
        None => None,
        Some(file) => {
            let contents =
                archive.read(&file, limits.max_file_size).or_raise(|| ErrorKind::invalid_archive("reading go.mod"))?;
            Some(parse_go_mod(&contents).or_raise(|| ErrorKind::invalid_archive("parsing go.mod"))?)
        },
    };
    if let Some(go_mod) = &go_mod
        && go_mod.module_path != module_path
    {
        exn::bail!(ErrorKind::AlternativeModule {
            requested: module_path.to_string(),
            canonical: go_mod.module_path.clone(),
        });
    }

    let licenses =
        detect(&archive, limits.max_license_size).or_raise(|| ErrorKind::invalid_archive("reading licenses"))?;
    let matcher = Matcher::new(licenses.iter().map(|license| license.metadata.clone()));
    let extracted = extract_packages_until(&archive, module_path, version, &matcher, limits, cancelled)?;

    Ok(Processed {
        go_mod,
        readme: read_readme(&archive, limits.max_license_size),
        redistributable: is_redistributable(matcher.root()),
        licenses,
        packages: extracted.packages,
        incomplete: extracted.incomplete,
    })
}

/// The first README at the module root, skipped if it is too large to read.
fn read_readme(archive: &ModuleArchive, max_size: u64) -> Option<Readme> {
    let file = archive
        .files()
        .filter(|file| file.dir().is_empty() && Readme::is_readme_filename(file.name()))
        .min_by_key(|file| file.path())?;
    match archive.read(&file, max_size) {
        Ok(contents) => Some(Readme {
            file_path: file.path().to_string(),
            contents: String::from_utf8_lossy(&contents).into_owned(),
        }),
        Err(err) => {
            tracing::warn!(path = file.path(), error = %err, "skipping README");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::MockProxy;
    use modfetch_archive::testing::ZipBuilder;
    use modfetch_cache::{Database, Repository};
    use modfetch_extract::BuildContext;
    use rstest::rstest;

    const MODULE: &str = "github.com/my/module";
    const MIT: &str = include_str!("../../license/templates/MIT.txt");
    const FOO_GO: &str = r#"// Package foo provides foo.
package foo

import "fmt"

// Hello says hello.
func Hello() { fmt.Println("hello") }
"#;

    fn commit_time() -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn zip(module_path: &str, version: &str, files: &[(&str, &str)]) -> Vec<u8> {
        files
            .iter()
            .fold(ZipBuilder::new(), |zip, (path, contents)| {
                zip.deflated(format!("{module_path}@{version}/{path}"), contents.as_bytes())
            })
            .finish()
    }

    fn module_zip(version: &str) -> Vec<u8> {
        zip(
            MODULE,
            version,
            &[
                ("go.mod", "module github.com/my/module\n\ngo 1.21\n"),
                ("LICENSE", MIT),
                ("README.md", "# module\n"),
                ("foo/foo.go", FOO_GO),
            ],
        )
    }

    async fn setup(proxy: MockProxy, exclusions: Exclusions, limits: Limits) -> (Fetcher, Repository, Arc<MockProxy>) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let proxy = Arc::new(proxy);
        let fetcher = Fetcher::new(proxy.clone(), Arc::new(repo.clone()), exclusions, limits);
        (fetcher, repo, proxy)
    }

    async fn setup_with(files: &[(&str, &str)]) -> (Fetcher, Repository, Arc<MockProxy>) {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", zip(MODULE, "v1.0.0", files))]);
        setup(proxy, Exclusions::default(), Limits::default()).await
    }

    #[tokio::test]
    async fn end_to_end() {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", module_zip("v1.0.0"))]);
        let (fetcher, repo, _) = setup(proxy, Exclusions::default(), Limits::default()).await;

        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::Ok, "{error:?}");
        assert!(error.is_none());

        let module = repo.get_module_version(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(module.commit_time, commit_time());
        assert_eq!(module.version_kind, VersionKind::Release);
        assert_eq!(module.repository_url.as_deref(), Some("https://github.com/my/module"));
        assert_eq!(module.readme.map(|readme| readme.file_path).as_deref(), Some("README.md"));
        assert!(module.has_go_mod);
        assert!(module.redistributable);
        assert!(!module.incomplete);

        let packages = repo.list_packages(MODULE, "v1.0.0").await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].path, "github.com/my/module/foo");
        assert_eq!(packages[0].synopsis, "Package foo provides foo.");
        assert_eq!(packages[0].imports, vec!["fmt"]);
        assert_eq!(packages[0].build_context, BuildContext::LinuxAmd64);
        assert!(packages[0].redistributable);

        let licenses = repo.list_licenses(MODULE, "v1.0.0").await.unwrap();
        assert_eq!(licenses.len(), 1);
        assert_eq!(licenses[0].metadata.types, vec!["MIT"]);

        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(state.status, 200);
        assert_eq!(state.try_count, 1);
        assert_eq!(state.error, None);
        assert_eq!(state.go_mod_path.as_deref(), Some(MODULE));
    }

    #[tokio::test]
    async fn repeated_fetches_are_idempotent() {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", module_zip("v1.0.0"))]);
        let (fetcher, repo, _) = setup(proxy, Exclusions::default(), Limits::default()).await;

        assert_eq!(fetcher.fetch_and_update_state(MODULE, "v1.0.0").await.0, StatusCode::Ok);
        let module = repo.get_module_version(MODULE, "v1.0.0").await.unwrap();
        let packages = repo.list_packages(MODULE, "v1.0.0").await.unwrap();
        let licenses = repo.list_licenses(MODULE, "v1.0.0").await.unwrap();

        assert_eq!(fetcher.fetch_and_update_state(MODULE, "v1.0.0").await.0, StatusCode::Ok);
        assert_eq!(repo.get_module_version(MODULE, "v1.0.0").await.unwrap(), module);
        assert_eq!(repo.list_packages(MODULE, "v1.0.0").await.unwrap(), packages);
        assert_eq!(repo.list_licenses(MODULE, "v1.0.0").await.unwrap(), licenses);
        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(state.try_count, 2);
    }

    #[tokio::test]
    async fn mismatched_go_mod_is_an_alternative_module() {
        let (fetcher, repo, _) =
            setup_with(&[("go.mod", "module github.com/other/module\n"), ("a.go", "package a\n")]).await;

        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::AlternativeModule);
        assert_eq!(error.unwrap().phase, Phase::ProcessContents);
        assert!(repo.get_module_version(MODULE, "v1.0.0").await.unwrap().is_none());
        assert_eq!(
            repo.get_alternative_module_path(MODULE).await.unwrap().as_deref(),
            Some("github.com/other/module")
        );
        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(state.status, 491);
        assert_eq!(state.go_mod_path.as_deref(), Some("github.com/other/module"));
    }

    #[tokio::test]
    async fn oversized_file_gives_incomplete_module() {
        let big = format!("package big\n\n{}", "// padding\n".repeat(100));
        let proxy = MockProxy::with_versions(
            commit_time(),
            [(MODULE, "v1.0.0", zip(MODULE, "v1.0.0", &[("big/big.go", &big), ("small/small.go", "package small\n")]))],
        );
        let limits = Limits { max_file_size: 200, ..Limits::default() };
        let (fetcher, repo, _) = setup(proxy, Exclusions::default(), limits).await;

        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::Incomplete);
        assert!(error.is_none());
        assert!(repo.get_module_version(MODULE, "v1.0.0").await.unwrap().unwrap().incomplete);
        let packages = repo.list_packages(MODULE, "v1.0.0").await.unwrap();
        let paths: Vec<_> = packages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["github.com/my/module/small"]);
        assert_eq!(repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap().status, 290);
    }

    #[tokio::test]
    async fn malformed_file_gives_incomplete_module() {
        let (fetcher, repo, _) = setup_with(&[
            ("go.mod", "module github.com/my/module\n"),
            ("good/good.go", "package good\n"),
            ("bad/bad.go", "package p\n\nfunc ([})\n\nvar z = ] q\n"),
        ])
        .await;

        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::Incomplete, "{error:?}");
        let packages = repo.list_packages(MODULE, "v1.0.0").await.unwrap();
        let paths: Vec<_> = packages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["github.com/my/module/good"]);
    }

    #[tokio::test]
    async fn taken_down_version_is_deleted() {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", module_zip("v1.0.0"))]);
        let (fetcher, repo, proxy) = setup(proxy, Exclusions::default(), Limits::default()).await;
        assert_eq!(fetcher.fetch_and_update_state(MODULE, "v1.0.0").await.0, StatusCode::Ok);

        proxy.take_down(MODULE, "v1.0.0").await;
        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::Gone);
        assert_eq!(error.unwrap().phase, Phase::ResolveVersion);
        assert!(repo.get_module_version(MODULE, "v1.0.0").await.unwrap().is_none());
        assert!(repo.list_packages(MODULE, "v1.0.0").await.unwrap().is_empty());
        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!((state.status, state.try_count), (410, 2));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let (fetcher, repo, _) = setup_with(&[("a.go", "package a\n")]).await;
        assert_eq!(fetcher.fetch_and_update_state(MODULE, "v9.9.9").await.0, StatusCode::NotFound);
        assert_eq!(repo.get_version_state(MODULE, "v9.9.9").await.unwrap().unwrap().status, 404);
    }

    #[rstest]
    #[case("", "v1.0.0")]
    #[case("github.com/my/../module", "v1.0.0")]
    #[case("github.com/my module", "v1.0.0")]
    #[case("/github.com/my/module", "v1.0.0")]
    #[case(MODULE, "1.0.0")]
    #[case(MODULE, "v1.0")]
    #[case(MODULE, "master")]
    #[tokio::test]
    async fn bad_requests(#[case] module_path: &str, #[case] version: &str) {
        let (fetcher, repo, proxy) = setup_with(&[("a.go", "package a\n")]).await;
        let (status, error) = fetcher.fetch_and_update_state(module_path, version).await;
        assert_eq!(status, StatusCode::BadRequest);
        assert_eq!(error.unwrap().phase, Phase::Validate);
        assert_eq!(proxy.archive_requests(), 0);
        assert_eq!(repo.get_version_state(module_path, version).await.unwrap().unwrap().status, 400);
    }

    #[rstest]
    #[case(MODULE, "v1.0.0")]
    #[case("github.com/my/module/sub", "v1.0.0")]
    #[tokio::test]
    async fn exclusions_are_checked_before_any_network_io(#[case] module_path: &str, #[case] version: &str) {
        let proxy = MockProxy::with_versions(commit_time(), [(module_path, version, Vec::new())]);
        let exclusions = Exclusions::new([MODULE], Vec::<String>::new());
        let (fetcher, _, proxy) = setup(proxy, exclusions, Limits::default()).await;
        assert_eq!(fetcher.fetch_and_update_state(module_path, version).await.0, StatusCode::Excluded);
        assert_eq!(proxy.archive_requests(), 0);
    }

    #[tokio::test]
    async fn excluded_version_resolved_from_latest() {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", module_zip("v1.0.0"))]);
        let exclusions = Exclusions::new(Vec::<String>::new(), ["github.com/my/module@v1.0.0"]);
        let (fetcher, repo, proxy) = setup(proxy, exclusions, Limits::default()).await;
        assert_eq!(fetcher.fetch_and_update_state(MODULE, LATEST).await.0, StatusCode::Excluded);
        assert_eq!(proxy.archive_requests(), 0);
        assert_eq!(repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap().status, 403);
    }

    #[tokio::test]
    async fn latest_is_resolved_through_the_proxy() {
        let proxy = MockProxy::with_versions(
            commit_time(),
            [(MODULE, "v1.0.0", module_zip("v1.0.0")), (MODULE, "v1.1.0", module_zip("v1.1.0"))],
        );
        let (fetcher, repo, _) = setup(proxy, Exclusions::default(), Limits::default()).await;
        assert_eq!(fetcher.fetch_and_update_state(MODULE, LATEST).await.0, StatusCode::Ok);
        assert!(repo.get_module_version(MODULE, "v1.1.0").await.unwrap().is_some());
        assert!(repo.get_version_state(MODULE, LATEST).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn proxy_failure_is_retryable() {
        let (fetcher, repo, proxy) = setup_with(&[("a.go", "package a\n")]).await;
        proxy.fail(MODULE, "v1.0.0", "connection reset").await;
        let before = UtcDateTime::now();
        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::BadGateway);
        assert!(status.is_retryable());
        assert!(error.unwrap().message().contains("connection reset"));
        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(state.status, 502);
        assert!(state.next_processed_after > before);
    }

    #[rstest]
    #[case(&[("README.md", "# nothing to see\n")])]
    #[case(&[("only_test.go", "package only\n")])]
    #[tokio::test]
    async fn modules_without_packages_are_not_acceptable(#[case] files: &[(&str, &str)]) {
        let (fetcher, repo, _) = setup_with(files).await;
        assert_eq!(fetcher.fetch_and_update_state(MODULE, "v1.0.0").await.0, StatusCode::NotAcceptable);
        assert!(repo.get_module_version(MODULE, "v1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_archive_is_not_acceptable() {
        let proxy = MockProxy::with_versions(commit_time(), [(MODULE, "v1.0.0", b"not a zip".to_vec())]);
        let (fetcher, _, _) = setup(proxy, Exclusions::default(), Limits::default()).await;
        let (status, error) = fetcher.fetch_and_update_state(MODULE, "v1.0.0").await;
        assert_eq!(status, StatusCode::NotAcceptable);
        assert_eq!(error.unwrap().phase, Phase::ProcessContents);
    }

    #[tokio::test]
    async fn timeouts_are_recorded() {
        let (fetcher, repo, _) = setup_with(&[("a.go", "package a\n")]).await;
        fetcher.record_timeout(MODULE, "v1.0.0").await.unwrap();
        let state = repo.get_version_state(MODULE, "v1.0.0").await.unwrap().unwrap();
        assert_eq!(state.status, 504);
        assert_eq!(state.error.as_deref(), Some("fetch timed out"));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let err = run_blocking(|| -> Result<()> { panic!("boom") }).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Internal("panic: boom".to_string()));
        assert_eq!(err.status(), StatusCode::Internal);
    }

    #[test]
    fn abandoned_processing_is_flagged() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop(cancelled.clone());
        assert!(!cancelled.load(Ordering::Relaxed));
        drop(guard);
        assert!(cancelled.load(Ordering::Relaxed));
    }

    #[rstest]
    #[case("github.com/bad", "v1.0.0", true)]
    #[case("github.com/bad/sub", "v1.0.0", true)]
    #[case("github.com/badger", "v1.0.0", false)]
    #[case("github.com/ok", "v1.0.0", true)]
    #[case("github.com/ok", "v1.0.1", false)]
    fn exclusion_matching(#[case] module_path: &str, #[case] version: &str, #[case] excluded: bool) {
        let exclusions = Exclusions::new(["github.com/bad/"], ["github.com/ok@v1.0.0", "malformed"]);
        assert_eq!(exclusions.is_excluded(module_path, version), excluded);
    }
}

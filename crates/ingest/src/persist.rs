//! The persistence seam the orchestrator and queue write through.

use async_trait::async_trait;
use exn::ResultExt;
use modfetch_cache::{Repository, VersionState, VersionStateUpdate};
use modfetch_extract::models::{ModuleVersion, Package};
use modfetch_license::License;

use crate::error::{ErrorKind, Result};

/// Durable storage for fetch results and fetch state.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fold one fetch attempt into the version's state.
    async fn upsert_version_state(&self, update: &VersionStateUpdate) -> Result<()>;

    /// Store a module version with its packages and licenses, atomically
    /// replacing whatever was stored for the same identity.
    async fn insert_module_version(&self, module: &ModuleVersion, packages: &[Package], licenses: &[License])
    -> Result<()>;

    /// Returns `false` if nothing was stored.
    async fn delete_module_version(&self, module_path: &str, version: &str) -> Result<bool>;

    /// Versions due for a first attempt or a retry.
    async fn get_next_versions_to_fetch(&self, limit: usize) -> Result<Vec<VersionState>>;

    async fn record_alternative_module_path(&self, alternative: &str, canonical: &str) -> Result<()>;

    /// Remove search rows of `module_path` older than `version`.
    async fn delete_search_documents(&self, module_path: &str, version: &str) -> Result<u64>;
}

#[async_trait]
impl Persistence for Repository {
    async fn upsert_version_state(&self, update: &VersionStateUpdate) -> Result<()> {
        Repository::upsert_version_state(self, update).await.or_raise(|| ErrorKind::Persistence)?;
        Ok(())
    }

    async fn insert_module_version(
        &self,
        module: &ModuleVersion,
        packages: &[Package],
        licenses: &[License],
    ) -> Result<()> {
        Repository::insert_module_version(self, module, packages, licenses).await.or_raise(|| ErrorKind::Persistence)
    }

    async fn delete_module_version(&self, module_path: &str, version: &str) -> Result<bool> {
        Repository::delete_module_version(self, module_path, version).await.or_raise(|| ErrorKind::Persistence)
    }

    async fn get_next_versions_to_fetch(&self, limit: usize) -> Result<Vec<VersionState>> {
        Repository::get_next_versions_to_fetch(self, limit).await.or_raise(|| ErrorKind::Persistence)
    }

    async fn record_alternative_module_path(&self, alternative: &str, canonical: &str) -> Result<()> {
        Repository::record_alternative_module_path(self, alternative, canonical)
            .await
            .or_raise(|| ErrorKind::Persistence)
    }

    async fn delete_search_documents(&self, module_path: &str, version: &str) -> Result<u64> {
        Repository::delete_older_search_documents(self, module_path, version).await.or_raise(|| ErrorKind::Persistence)
    }
}

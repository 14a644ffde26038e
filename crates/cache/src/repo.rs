//! Repository for module versions and their fetch state.
//!
//! A module version and its packages and licenses are written and deleted as
//! a unit; fetch state lives beside them, keyed by the same identity, and
//! outlives them (a taken-down version keeps its state row).

use std::cmp::Ordering;

use exn::ResultExt;
use modfetch_extract::compare_versions;
use modfetch_extract::models::{ModuleVersion, Package};
use modfetch_license::License;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    LicenseRow, MAX_BACKOFF_EXPONENT, ModuleRow, PackageRow, SearchDocument, SearchDocumentRow, VersionState,
    VersionStateRow, VersionStateUpdate,
};

/// Statuses at or above this value are retried with backoff.
const FIRST_RETRYABLE_STATUS: u16 = 500;

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn limit(limit: usize) -> Result<i64> {
        i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))
    }

    // =========================================================================
    // Version state
    // =========================================================================

    /// Register a version as known but not yet attempted. Existing state is
    /// left untouched.
    pub async fn insert_index_version(&self, module_path: &str, version: &str, timestamp: UtcDateTime) -> Result<()> {
        let now = UtcDateTime::now().unix_timestamp();
        sqlx::query(include_str!("../queries/insert_index_version.sql"))
            .bind(module_path)
            .bind(version)
            .bind(timestamp.unix_timestamp())
            .bind(now)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Fold the outcome of one fetch attempt into the version's state.
    ///
    /// Increments the try count and, for retryable statuses, pushes the next
    /// eligible time back by [`retry_delay`](crate::retry_delay) of the new try count. Runs as a
    /// single statement, so concurrent attempts never lose an increment.
    /// Returns the new try count.
    #[instrument(
        skip(self, update),
        fields(module = %update.module_path, version = %update.version, status = update.status)
    )]
    pub async fn upsert_version_state(&self, update: &VersionStateUpdate) -> Result<u32> {
        let tries: i64 = sqlx::query_scalar(include_str!("../queries/upsert_version_state.sql"))
            .bind(&update.module_path)
            .bind(&update.version)
            .bind(i64::from(update.status))
            .bind(&update.error)
            .bind(&update.go_mod_path)
            .bind(update.timestamp.unix_timestamp())
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(i64::from(FIRST_RETRYABLE_STATUS))
            .bind(i64::from(MAX_BACKOFF_EXPONENT))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u32::try_from(tries).or_raise(|| ErrorKind::InvalidData("try count"))
    }

    pub async fn get_version_state(&self, module_path: &str, version: &str) -> Result<Option<VersionState>> {
        let row: Option<VersionStateRow> = sqlx::query_as(include_str!("../queries/get_version_state.sql"))
            .bind(module_path)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(VersionState::try_from).transpose()
    }

    /// Versions that are due for a (re)try: never attempted, or last failed
    /// with a retryable status and past their backoff. Least-tried first,
    /// then oldest.
    pub async fn get_next_versions_to_fetch(&self, limit: usize) -> Result<Vec<VersionState>> {
        let rows: Vec<VersionStateRow> = sqlx::query_as(include_str!("../queries/get_next_versions_to_fetch.sql"))
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(Self::limit(limit)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(VersionState::try_from).collect()
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Store a module version with its packages and licenses, replacing
    /// anything previously stored for the same identity.
    ///
    /// Also points the search document of every package path at this
    /// version.
    #[instrument(skip_all, fields(module = %module.module_path, version = %module.version, packages = packages.len()))]
    pub async fn insert_module_version(
        &self,
        module: &ModuleVersion,
        packages: &[Package],
        licenses: &[License],
    ) -> Result<()> {
        let module_row = ModuleRow::from(module);
        let package_rows = packages.iter().map(PackageRow::try_from).collect::<Result<Vec<_>>>()?;
        let license_rows = licenses.iter().map(LicenseRow::try_from).collect::<Result<Vec<_>>>()?;
        let now = UtcDateTime::now().unix_timestamp();

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_module.sql"))
            .bind(&module.module_path)
            .bind(&module.version)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/insert_module.sql"))
            .bind(module_row.module_path)
            .bind(module_row.version)
            .bind(module_row.commit_time)
            .bind(module_row.version_kind)
            .bind(module_row.readme_file_path)
            .bind(module_row.readme_contents)
            .bind(module_row.repository_url)
            .bind(module_row.has_go_mod)
            .bind(module_row.go_mod_path)
            .bind(module_row.deprecated)
            .bind(module_row.retracted)
            .bind(module_row.incomplete)
            .bind(module_row.redistributable)
            .bind(module_row.archive_hash)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for row in license_rows {
            sqlx::query(include_str!("../queries/insert_license.sql"))
                .bind(&module.module_path)
                .bind(&module.version)
                .bind(row.file_path)
                .bind(row.types)
                .bind(row.coverage)
                .bind(row.contents)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        for row in package_rows {
            sqlx::query(include_str!("../queries/upsert_search_document.sql"))
                .bind(&row.path)
                .bind(&module.module_path)
                .bind(&module.version)
                .bind(&row.synopsis)
                .bind(row.redistributable)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            sqlx::query(include_str!("../queries/insert_package.sql"))
                .bind(&module.module_path)
                .bind(&module.version)
                .bind(row.path)
                .bind(row.build_context)
                .bind(row.directory)
                .bind(row.name)
                .bind(row.synopsis)
                .bind(row.documentation)
                .bind(row.imports)
                .bind(row.licenses)
                .bind(row.redistributable)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record that `alternative` served an archive for `canonical`.
    pub async fn record_alternative_module_path(&self, alternative: &str, canonical: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_alternative_module_path.sql"))
            .bind(alternative)
            .bind(canonical)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn get_alternative_module_path(&self, alternative: &str) -> Result<Option<String>> {
        sqlx::query_scalar(include_str!("../queries/get_alternative_module_path.sql"))
            .bind(alternative)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn get_module_version(&self, module_path: &str, version: &str) -> Result<Option<ModuleVersion>> {
        let row: Option<ModuleRow> = sqlx::query_as(include_str!("../queries/get_module.sql"))
            .bind(module_path)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ModuleVersion::try_from).transpose()
    }

    /// Packages of a module version, ordered by import path and then build
    /// context order.
    pub async fn list_packages(&self, module_path: &str, version: &str) -> Result<Vec<Package>> {
        let rows: Vec<PackageRow> = sqlx::query_as(include_str!("../queries/list_packages.sql"))
            .bind(module_path)
            .bind(version)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut packages = rows.into_iter().map(Package::try_from).collect::<Result<Vec<_>>>()?;
        packages.sort_by(|a, b| a.path.cmp(&b.path).then(a.build_context.cmp(&b.build_context)));
        Ok(packages)
    }

    pub async fn list_licenses(&self, module_path: &str, version: &str) -> Result<Vec<License>> {
        let rows: Vec<LicenseRow> = sqlx::query_as(include_str!("../queries/list_licenses.sql"))
            .bind(module_path)
            .bind(version)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(License::try_from).collect()
    }

    pub async fn list_search_documents(&self, module_path: &str) -> Result<Vec<SearchDocument>> {
        let rows: Vec<SearchDocumentRow> =
            sqlx::query_as(include_str!("../queries/list_search_documents_for_module.sql"))
                .bind(module_path)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(SearchDocument::try_from).collect()
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a module version with its packages and licenses, and the search
    /// documents that point at it. Returns `false` if nothing was stored.
    #[instrument(skip(self))]
    pub async fn delete_module_version(&self, module_path: &str, version: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query(include_str!("../queries/delete_module.sql"))
            .bind(module_path)
            .bind(version)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_search_documents_for_version.sql"))
            .bind(module_path)
            .bind(version)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the search documents of `module_path` that point at a version
    /// older than `version`. Returns how many were deleted.
    ///
    /// Documents whose version can't be compared are treated as stale.
    #[instrument(skip(self))]
    pub async fn delete_older_search_documents(&self, module_path: &str, version: &str) -> Result<u64> {
        let documents = self.list_search_documents(module_path).await?;
        let stale: Vec<_> = documents
            .into_iter()
            .filter(|doc| !matches!(compare_versions(&doc.version, version), Ok(Ordering::Equal | Ordering::Greater)))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut deleted = 0;
        for doc in stale {
            deleted += sqlx::query(include_str!("../queries/delete_search_document.sql"))
                .bind(doc.package_path)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?
                .rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }
}

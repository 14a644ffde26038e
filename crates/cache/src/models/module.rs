use exn::ResultExt;
use modfetch_extract::VersionKind;
use modfetch_extract::models::{ModuleVersion, Readme};

use super::timestamp;
use crate::error::{Error, ErrorKind};

#[derive(sqlx::FromRow)]
pub(crate) struct ModuleRow {
    pub(crate) module_path: String,
    pub(crate) version: String,
    pub(crate) commit_time: i64,
    pub(crate) version_kind: String,
    pub(crate) readme_file_path: Option<String>,
    pub(crate) readme_contents: Option<String>,
    pub(crate) repository_url: Option<String>,
    pub(crate) has_go_mod: bool,
    pub(crate) go_mod_path: Option<String>,
    pub(crate) deprecated: Option<String>,
    pub(crate) retracted: bool,
    pub(crate) incomplete: bool,
    pub(crate) redistributable: bool,
    pub(crate) archive_hash: String,
}

impl From<&ModuleVersion> for ModuleRow {
    fn from(module: &ModuleVersion) -> Self {
        Self {
            module_path: module.module_path.clone(),
            version: module.version.clone(),
            commit_time: module.commit_time.unix_timestamp(),
            version_kind: module.version_kind.to_string(),
            readme_file_path: module.readme.as_ref().map(|r| r.file_path.clone()),
            readme_contents: module.readme.as_ref().map(|r| r.contents.clone()),
            repository_url: module.repository_url.clone(),
            has_go_mod: module.has_go_mod,
            go_mod_path: module.go_mod_path.clone(),
            deprecated: module.deprecated.clone(),
            retracted: module.retracted,
            incomplete: module.incomplete,
            redistributable: module.redistributable,
            archive_hash: module.archive_hash.clone(),
        }
    }
}

impl TryFrom<ModuleRow> for ModuleVersion {
    type Error = Error;
    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        let readme = match (row.readme_file_path, row.readme_contents) {
            (Some(file_path), Some(contents)) => Some(Readme { file_path, contents }),
            (None, None) => None,
            _ => exn::bail!(ErrorKind::InvalidData("readme")),
        };
        Ok(Self {
            module_path: row.module_path,
            version: row.version,
            commit_time: timestamp(row.commit_time, "commit time")?,
            version_kind: row.version_kind.parse::<VersionKind>().or_raise(|| ErrorKind::InvalidData("version kind"))?,
            readme,
            repository_url: row.repository_url,
            has_go_mod: row.has_go_mod,
            go_mod_path: row.go_mod_path,
            deprecated: row.deprecated,
            retracted: row.retracted,
            incomplete: row.incomplete,
            redistributable: row.redistributable,
            archive_hash: row.archive_hash,
        })
    }
}

use time::UtcDateTime;

use super::timestamp;
use crate::error::Error;

/// The search-facing summary of the latest known version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
    pub synopsis: String,
    pub redistributable: bool,
    pub updated_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct SearchDocumentRow {
    pub(crate) package_path: String,
    pub(crate) module_path: String,
    pub(crate) version: String,
    pub(crate) synopsis: String,
    pub(crate) redistributable: bool,
    pub(crate) updated_at: i64,
}

impl TryFrom<SearchDocumentRow> for SearchDocument {
    type Error = Error;
    fn try_from(row: SearchDocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            package_path: row.package_path,
            module_path: row.module_path,
            version: row.version,
            synopsis: row.synopsis,
            redistributable: row.redistributable,
            updated_at: timestamp(row.updated_at, "updated at")?,
        })
    }
}

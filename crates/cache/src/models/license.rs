use exn::ResultExt;
use modfetch_license::{Coverage, License, Metadata};
use serde_json::{from_str as from_json, to_string as to_json};

use crate::error::{Error, ErrorKind};

#[derive(sqlx::FromRow)]
pub(crate) struct LicenseRow {
    pub(crate) file_path: String,
    pub(crate) types: String,
    pub(crate) coverage: String,
    pub(crate) contents: Vec<u8>,
}

impl TryFrom<&License> for LicenseRow {
    type Error = Error;
    fn try_from(license: &License) -> Result<Self, Self::Error> {
        Ok(Self {
            file_path: license.metadata.file_path.clone(),
            types: to_json(&license.metadata.types).or_raise(|| ErrorKind::InvalidData("license types"))?,
            coverage: to_json(&license.metadata.coverage).or_raise(|| ErrorKind::InvalidData("license coverage"))?,
            contents: license.contents.clone(),
        })
    }
}

impl TryFrom<LicenseRow> for License {
    type Error = Error;
    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            metadata: Metadata {
                types: from_json::<Vec<String>>(&row.types).or_raise(|| ErrorKind::InvalidData("license types"))?,
                file_path: row.file_path,
                coverage: from_json::<Coverage>(&row.coverage)
                    .or_raise(|| ErrorKind::InvalidData("license coverage"))?,
            },
            contents: row.contents,
        })
    }
}

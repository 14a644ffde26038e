use exn::ResultExt;
use modfetch_extract::BuildContext;
use modfetch_extract::models::Package;
use modfetch_license::Metadata;
use serde_json::{from_str as from_json, to_string as to_json};

use crate::error::{Error, ErrorKind};

#[derive(sqlx::FromRow)]
pub(crate) struct PackageRow {
    pub(crate) path: String,
    pub(crate) build_context: String,
    pub(crate) directory: String,
    pub(crate) name: String,
    pub(crate) synopsis: String,
    pub(crate) documentation: String,
    pub(crate) imports: String,
    pub(crate) licenses: String,
    pub(crate) redistributable: bool,
}

impl TryFrom<&Package> for PackageRow {
    type Error = Error;
    fn try_from(package: &Package) -> Result<Self, Self::Error> {
        Ok(Self {
            path: package.path.clone(),
            build_context: package.build_context.to_string(),
            directory: package.directory.clone(),
            name: package.name.clone(),
            synopsis: package.synopsis.clone(),
            documentation: package.documentation.clone(),
            imports: to_json(&package.imports).or_raise(|| ErrorKind::InvalidData("imports"))?,
            licenses: to_json(&package.licenses).or_raise(|| ErrorKind::InvalidData("licenses"))?,
            redistributable: package.redistributable,
        })
    }
}

impl TryFrom<PackageRow> for Package {
    type Error = Error;
    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            directory: row.directory,
            name: row.name,
            synopsis: row.synopsis,
            documentation: row.documentation,
            imports: from_json::<Vec<String>>(&row.imports).or_raise(|| ErrorKind::InvalidData("imports"))?,
            build_context: row
                .build_context
                .parse::<BuildContext>()
                .or_raise(|| ErrorKind::InvalidData("build context"))?,
            licenses: from_json::<Vec<Metadata>>(&row.licenses).or_raise(|| ErrorKind::InvalidData("licenses"))?,
            redistributable: row.redistributable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = PackageRow {
            path: "github.com/my/module/foo".to_string(),
            build_context: "windows/amd64".to_string(),
            directory: "foo".to_string(),
            name: "foo".to_string(),
            synopsis: "Package foo is for Windows.".to_string(),
            documentation: "# package foo\n".to_string(),
            imports: r#"["fmt","os"]"#.to_string(),
            licenses: concat!(
                r#"[{"types":["MIT"],"file_path":"LICENSE","#,
                r#""coverage":{"percent":100.0,"matches":[{"id":"MIT","percent":100.0}]}}]"#,
            )
            .to_string(),
            redistributable: true,
        };
        let package = Package::try_from(row).unwrap();
        assert_eq!(package.build_context, BuildContext::WindowsAmd64);
        assert_eq!(package.imports, vec!["fmt", "os"]);
        assert_eq!(package.licenses[0].types, vec!["MIT"]);
    }

    #[test]
    fn test_unknown_build_context() {
        let row = PackageRow {
            path: "github.com/my/module".to_string(),
            build_context: "plan9/386".to_string(),
            directory: String::new(),
            name: "module".to_string(),
            synopsis: String::new(),
            documentation: String::new(),
            imports: "[]".to_string(),
            licenses: "[]".to_string(),
            redistributable: false,
        };
        let err = Package::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("build context")));
    }
}

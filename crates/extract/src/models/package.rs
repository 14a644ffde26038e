use modfetch_license::Metadata as LicenseMetadata;

use crate::consts::STD_MODULE;
use crate::context::BuildContext;

/// One package of a module version, as built for a single build context.
///
/// A directory that builds differently per platform produces one `Package`
/// per distinct build; a directory that is the same everywhere produces one,
/// tagged with the first context in [`BuildContext::ALL`] that built it.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub path: String,
    /// Directory inside the module, `""` for the module root.
    pub directory: String,
    pub name: String,
    pub synopsis: String,
    pub documentation: String,
    pub imports: Vec<String>,
    pub build_context: BuildContext,
    /// Licenses that apply to the package's directory.
    pub licenses: Vec<LicenseMetadata>,
    pub redistributable: bool,
}

impl Package {
    /// Returns `true` if this is the package at the root of its module.
    pub fn is_module_root(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Import path of the package in `dir` of `module_path`.
pub fn import_path(module_path: &str, dir: &str) -> String {
    match (module_path, dir) {
        (_, "") => module_path.to_string(),
        (STD_MODULE, _) => dir.to_string(),
        _ => format!("{module_path}/{dir}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("github.com/my/module", "", "github.com/my/module")]
    #[case("github.com/my/module", "foo/bar", "github.com/my/module/foo/bar")]
    #[case("std", "net/http", "net/http")]
    fn import_paths(#[case] module: &str, #[case] dir: &str, #[case] expected: &str) {
        assert_eq!(import_path(module, dir), expected);
    }
}

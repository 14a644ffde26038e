use time::UtcDateTime;

use crate::version::VersionKind;

/// A README found at the module root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readme {
    pub file_path: String,
    pub contents: String,
}

impl Readme {
    /// Returns `true` for `README` and `README.<ext>`, in any case.
    pub fn is_readme_filename(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower == "readme" || lower.strip_prefix("readme.").is_some_and(|ext| !ext.is_empty() && !ext.contains('.'))
    }
}

/// A successfully fetched version of a module.
///
/// Identified by `(module_path, version)`. Re-fetching the same identity
/// produces a new value that replaces the stored one wholesale; nothing
/// mutates a `ModuleVersion` once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub module_path: String,
    pub version: String,
    pub commit_time: UtcDateTime,
    pub version_kind: VersionKind,
    pub readme: Option<Readme>,
    pub repository_url: Option<String>,
    /// Whether the archive carried a `go.mod` at its root.
    pub has_go_mod: bool,
    /// Module path declared by that `go.mod`.
    pub go_mod_path: Option<String>,
    pub deprecated: Option<String>,
    pub retracted: bool,
    /// Some directories could not be turned into packages.
    pub incomplete: bool,
    /// The licenses at the module root permit redistribution.
    pub redistributable: bool,
    /// BLAKE3 hash of the archive bytes.
    pub archive_hash: String,
}

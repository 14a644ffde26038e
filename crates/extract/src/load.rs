use std::collections::BTreeSet;

use tracing::instrument;

use crate::context::BuildContext;
use crate::doc;
use crate::error::{ErrorKind, Result};
use crate::source::{ParsedFile, parse_file};

/// Name given to directories that only hold documentation, never built.
const DOCUMENTATION_PACKAGE: &str = "documentation";

/// One Go source file of a directory, named by its base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), contents: contents.into() }
    }
}

/// A package as seen from one build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPackage {
    pub name: String,
    pub synopsis: String,
    pub documentation: String,
    pub imports: Vec<String>,
}

/// The source files of one directory, parsed once and loadable under any
/// build context.
///
/// Files are parsed eagerly but parse failures are only reported when a
/// context actually includes the broken file, the same way the Go tool never
/// looks inside `foo_windows.go` when building for Linux.
#[derive(Debug)]
pub struct Loader {
    dir: String,
    files: Vec<(String, std::result::Result<ParsedFile, ErrorKind>)>,
}

impl Loader {
    pub fn new(dir: impl Into<String>, mut files: Vec<SourceFile>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        let files = files
            .into_iter()
            .filter(|file| file.name.ends_with(".go") && !file.name.ends_with("_test.go"))
            .map(|file| {
                let parsed = parse_file(&file.name, &file.contents).map_err(|err| (*err).clone());
                (file.name, parsed)
            })
            .collect();
        Self { dir: dir.into(), files }
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Returns `true` if the directory holds any non-test Go source files.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Load the package that `ctx` would build from this directory, or
    /// `None` if every file is excluded under it.
    #[instrument(level = "debug", skip(self), fields(dir = %self.dir, context = %ctx))]
    pub fn load(&self, ctx: BuildContext) -> Result<Option<LoadedPackage>> {
        let mut included: Vec<&ParsedFile> = Vec::new();
        for (name, parsed) in &self.files {
            if !ctx.matches_file_name(name) {
                continue;
            }
            let file = match parsed {
                Ok(file) => file,
                Err(kind) => return Err(exn::Exn::from(kind.clone())),
            };
            if file.constraint.as_ref().is_some_and(|expr| !expr.eval(ctx)) {
                continue;
            }
            if !ctx.cgo_enabled() && file.imports.iter().any(|import| import == "C") {
                continue;
            }
            if file.package == DOCUMENTATION_PACKAGE {
                continue;
            }
            included.push(file);
        }
        let Some(first) = included.first() else {
            return Ok(None);
        };

        let names: BTreeSet<&str> = included.iter().map(|file| file.package.as_str()).collect();
        if names.len() > 1 {
            exn::bail!(ErrorKind::MultiplePackages(names.into_iter().map(String::from).collect()));
        }

        let imports: BTreeSet<&str> =
            included.iter().flat_map(|file| file.imports.iter().map(String::as_str)).collect();
        let package_doc = included
            .iter()
            .map(|file| file.doc.as_str())
            .filter(|doc| !doc.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let decls: Vec<_> = included.iter().flat_map(|file| file.decls.iter().cloned()).collect();

        Ok(Some(LoadedPackage {
            name: first.package.clone(),
            synopsis: doc::synopsis(&package_doc),
            documentation: doc::render(&first.package, &package_doc, &decls),
            imports: imports.into_iter().map(String::from).collect(),
        }))
    }
}

/// Load one directory's package under a single build context.
pub fn load_package(dir: &str, files: Vec<SourceFile>, ctx: BuildContext) -> Result<Option<LoadedPackage>> {
    Loader::new(dir, files).load(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(files: &[(&str, &str)]) -> Loader {
        Loader::new("foo", files.iter().map(|(name, src)| SourceFile::new(*name, src.as_bytes())).collect())
    }

    #[test]
    fn partitions_by_build_tag() {
        let loader = loader(&[
            ("a.go", "//go:build windows\n\n// Package foo is for Windows.\npackage foo\n"),
            ("b.go", "//go:build darwin\n\n// Package foo is for macOS.\npackage foo\n"),
        ]);
        let loaded = BuildContext::ALL.map(|ctx| loader.load(ctx).unwrap());
        assert_eq!(loaded[0], None);
        assert_eq!(loaded[1].as_ref().unwrap().synopsis, "Package foo is for Windows.");
        assert_eq!(loaded[2].as_ref().unwrap().synopsis, "Package foo is for macOS.");
        assert_eq!(loaded[3], None);
    }

    #[test]
    fn merges_files_and_imports() {
        let loader = loader(&[
            ("b.go", "package foo\n\nimport (\n\t\"strings\"\n\t\"fmt\"\n)\n"),
            ("a.go", "// Package foo merges.\npackage foo\n\nimport \"fmt\"\n"),
            ("a_test.go", "package foo_test\n\nimport \"testing\"\n"),
        ]);
        let pkg = loader.load(BuildContext::LinuxAmd64).unwrap().unwrap();
        assert_eq!(pkg.name, "foo");
        assert_eq!(pkg.imports, vec!["fmt", "strings"]);
        assert_eq!(pkg.synopsis, "Package foo merges.");
    }

    #[test]
    fn conflicting_package_names() {
        let loader = loader(&[("a.go", "package foo\n"), ("b.go", "package bar\n")]);
        let err = loader.load(BuildContext::LinuxAmd64).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MultiplePackages(names) if names == &["bar", "foo"]));
        assert!(err.is_bad_package());
    }

    #[test]
    fn syntax_errors_only_surface_when_included() {
        let loader = loader(&[("a.go", "package foo\n"), ("b_windows.go", "package foo\nfunc {\n")]);
        assert!(loader.load(BuildContext::LinuxAmd64).unwrap().is_some());
        assert!(loader.load(BuildContext::WindowsAmd64).is_err());
    }

    #[test]
    fn cgo_files_excluded_without_cgo() {
        let loader = loader(&[("a.go", "package foo\n\nimport \"C\"\n")]);
        assert!(loader.load(BuildContext::LinuxAmd64).unwrap().is_some());
        assert_eq!(loader.load(BuildContext::JsWasm).unwrap(), None);
    }

    #[test]
    fn documentation_package_is_ignored() {
        let loader = loader(&[("doc.go", "package documentation\n")]);
        assert!(loader.has_files());
        assert_eq!(loader.load(BuildContext::LinuxAmd64).unwrap(), None);
    }

    #[test]
    fn test_only_directory_has_no_files() {
        assert!(!loader(&[("a_test.go", "package foo\n")]).has_files());
    }
}

//! Turning a module archive into packages.
//!
//! Processing runs in two phases. The first walks the archive's metadata
//! once: it rejects archives that are not laid out like a module, groups Go
//! files by directory and sets aside directories that cannot be processed
//! (oversized files) without reading anything. The second loads each
//! remaining directory under every [`BuildContext`], in order.
//!
//! Problems confined to one directory make the module incomplete; problems
//! with the module as a whole (bad layout, blown ceilings, nothing usable)
//! fail it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use exn::ResultExt;
use modfetch_archive::{File, ModuleArchive};
use modfetch_config::Limits;
use modfetch_extract::models::{Package, import_path};
use modfetch_extract::{BuildContext, LoadedPackage, Loader, SourceFile};
use modfetch_license::{Matcher, is_redistributable};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Packages extracted from an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub packages: Vec<Package>,
    /// At least one directory with Go source did not produce a package.
    pub incomplete: bool,
}

/// Returns `true` for directories the Go tool never builds as part of the
/// module: hidden or `_`-prefixed elements, `testdata` and vendored code.
fn is_ignored(path: &str) -> bool {
    path.split('/').any(|element| {
        element.starts_with('.') || element.starts_with('_') || element == "testdata" || element == "vendor"
    })
}

/// Extract every package of `module_path@version` from `archive`.
///
/// This reads and parses source, so callers on an async runtime should run it
/// on a blocking thread.
pub fn extract_packages(
    archive: &ModuleArchive,
    module_path: &str,
    version: &str,
    matcher: &Matcher,
    limits: &Limits,
) -> Result<Extracted> {
    extract_packages_until(archive, module_path, version, matcher, limits, &AtomicBool::new(false))
}

/// [`extract_packages`] that gives up with [`ErrorKind::Timeout`] before the
/// next directory once `cancelled` is set.
#[instrument(skip(archive, matcher, limits, cancelled))]
pub(crate) fn extract_packages_until(
    archive: &ModuleArchive,
    module_path: &str,
    version: &str,
    matcher: &Matcher,
    limits: &Limits,
    cancelled: &AtomicBool,
) -> Result<Extracted> {
    for entry in archive.entries() {
        if entry.is_dir() {
            exn::bail!(ErrorKind::invalid_archive(format!("unexpected directory entry {}", entry.name())));
        }
        if archive.logical_path(entry).is_none() {
            exn::bail!(ErrorKind::invalid_archive(format!("{} is outside {}", entry.name(), archive.prefix())));
        }
    }

    // Phase 1: metadata only.
    let mut directories: BTreeMap<&str, Vec<File<'_>>> = BTreeMap::new();
    let mut oversized: BTreeSet<&str> = BTreeSet::new();
    for file in archive.files() {
        if !file.name().ends_with(".go") || is_ignored(file.path()) {
            continue;
        }
        let dir = file.dir();
        if file.size() > limits.max_file_size {
            tracing::warn!(path = file.path(), size = file.size(), "source file too large, skipping directory");
            oversized.insert(dir);
        }
        directories.entry(dir).or_default().push(file);
        if directories.len() > limits.max_directories {
            exn::bail!(ErrorKind::too_large(format!("more than {} directories", limits.max_directories)));
        }
    }

    // Phase 2: load every usable directory under every build context.
    let mut incomplete = !oversized.is_empty();
    let mut packages = Vec::new();
    for (dir, files) in directories {
        if cancelled.load(Ordering::Relaxed) {
            tracing::debug!(dir, "processing abandoned");
            exn::bail!(ErrorKind::Timeout);
        }
        if oversized.contains(dir) {
            continue;
        }
        let sources = files
            .iter()
            .map(|file| {
                let contents = archive
                    .read(file, limits.max_file_size)
                    .or_raise(|| ErrorKind::invalid_archive(format!("reading {}", file.path())))?;
                Ok(SourceFile::new(file.name(), contents))
            })
            .collect::<Result<Vec<_>>>()?;
        let loader = Loader::new(dir, sources);
        if !loader.has_files() {
            continue;
        }
        let Some(built) = load_all_contexts(&loader)? else {
            incomplete = true;
            continue;
        };
        if built.is_empty() {
            tracing::debug!(dir, "directory builds under no context");
            incomplete = true;
            continue;
        }

        let licenses = matcher.matches(dir);
        let redistributable = is_redistributable(&licenses);
        for (build_context, loaded) in built {
            if loaded.imports.len() > limits.max_imports_per_package {
                exn::bail!(ErrorKind::too_large(format!(
                    "{} imports more than {} packages",
                    import_path(module_path, dir),
                    limits.max_imports_per_package
                )));
            }
            packages.push(Package {
                path: import_path(module_path, dir),
                directory: dir.to_string(),
                name: loaded.name,
                synopsis: loaded.synopsis,
                documentation: loaded.documentation,
                imports: loaded.imports,
                build_context,
                licenses: licenses.clone(),
                redistributable,
            });
            if packages.len() > limits.max_packages_per_module {
                exn::bail!(ErrorKind::too_large(format!("more than {} packages", limits.max_packages_per_module)));
            }
        }
    }

    if packages.is_empty() {
        exn::bail!(ErrorKind::NoPackages);
    }
    tracing::debug!(packages = packages.len(), incomplete, "extracted packages");
    Ok(Extracted { packages, incomplete })
}

/// Load `loader` under every build context, dropping builds identical to one
/// from an earlier context. `None` if the directory is a bad package.
fn load_all_contexts(loader: &Loader) -> Result<Option<Vec<(BuildContext, LoadedPackage)>>> {
    let mut built: Vec<(BuildContext, LoadedPackage)> = Vec::new();
    for ctx in BuildContext::ALL {
        match loader.load(ctx) {
            Ok(Some(package)) => {
                if !built.iter().any(|(_, seen)| *seen == package) {
                    built.push((ctx, package));
                }
            },
            Ok(None) => {},
            Err(err) if err.is_bad_package() => {
                tracing::warn!(dir = loader.dir(), context = %ctx, error = %err, "bad package");
                return Ok(None);
            },
            Err(err) => {
                let kind = ErrorKind::Internal(format!("loading {}", loader.dir()));
                return Err(err.raise(kind));
            },
        }
    }
    Ok(Some(built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modfetch_archive::testing::ZipBuilder;
    use modfetch_license::detect;
    use rstest::rstest;

    const MODULE: &str = "github.com/my/module";
    const VERSION: &str = "v1.0.0";
    const MIT: &str = include_str!("../../license/templates/MIT.txt");

    fn archive(files: &[(&str, &str)]) -> ModuleArchive {
        let prefix = format!("{MODULE}@{VERSION}/");
        let zip = files
            .iter()
            .fold(ZipBuilder::new(), |zip, (path, contents)| {
                zip.deflated(format!("{prefix}{path}"), contents.as_bytes())
            })
            .finish();
        ModuleArchive::from_bytes(zip, MODULE, VERSION).unwrap()
    }

    fn extract(archive: &ModuleArchive, limits: &Limits) -> Result<Extracted> {
        let licenses = detect(archive, limits.max_license_size).unwrap();
        let matcher = Matcher::new(licenses.into_iter().map(|license| license.metadata));
        extract_packages(archive, MODULE, VERSION, &matcher, limits)
    }

    #[test]
    fn single_package_with_root_license() {
        let archive = archive(&[("LICENSE", MIT), ("foo/foo.go", "// Package foo does things.\npackage foo\n")]);
        let extracted = extract(&archive, &Limits::default()).unwrap();
        assert!(!extracted.incomplete);
        assert_eq!(extracted.packages.len(), 1);
        let package = &extracted.packages[0];
        assert_eq!(package.path, "github.com/my/module/foo");
        assert_eq!(package.directory, "foo");
        assert_eq!(package.synopsis, "Package foo does things.");
        assert_eq!(package.build_context, BuildContext::LinuxAmd64);
        assert_eq!(package.licenses.len(), 1);
        assert!(package.redistributable);
    }

    #[test]
    fn build_contexts_partition_a_directory() {
        let archive = archive(&[
            ("sys/sys_windows.go", "// Package sys talks to Windows.\npackage sys\n"),
            ("sys/sys_darwin.go", "// Package sys talks to macOS.\npackage sys\n"),
        ]);
        let extracted = extract(&archive, &Limits::default()).unwrap();
        let built: Vec<_> = extracted.packages.iter().map(|p| (p.build_context, p.synopsis.as_str())).collect();
        assert_eq!(
            built,
            vec![
                (BuildContext::WindowsAmd64, "Package sys talks to Windows."),
                (BuildContext::DarwinAmd64, "Package sys talks to macOS."),
            ]
        );
        assert!(!extracted.incomplete);
    }

    #[test]
    fn oversized_file_excludes_only_its_directory() {
        let big = format!("package big\n\n{}", "// padding\n".repeat(100));
        let archive = archive(&[("big/big.go", &big), ("small/small.go", "package small\n")]);
        let limits = Limits { max_file_size: 200, ..Limits::default() };
        let extracted = extract(&archive, &limits).unwrap();
        assert!(extracted.incomplete);
        let paths: Vec<_> = extracted.packages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["github.com/my/module/small"]);
    }

    #[test]
    fn cancelled_extraction_stops_before_loading() {
        let archive = archive(&[("a/a.go", "package a\n"), ("b/b.go", "package b\n")]);
        let matcher = Matcher::new(Vec::<modfetch_license::Metadata>::new());
        let cancelled = AtomicBool::new(true);
        let err = extract_packages_until(&archive, MODULE, VERSION, &matcher, &Limits::default(), &cancelled)
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Timeout);
    }

    #[rstest]
    #[case::missing_package_clause("func main() {}\n")]
    #[case::malformed_receiver("package p\n\nfunc ([})\n\nvar z = ] q\n")]
    #[case::receiver_without_name("package p\nfunc (r T)\n")]
    fn bad_package_is_skipped(#[case] bad: &str) {
        let archive = archive(&[("bad/bad.go", bad), ("good/good.go", "package good\n")]);
        let extracted = extract(&archive, &Limits::default()).unwrap();
        assert!(extracted.incomplete);
        assert_eq!(extracted.packages.len(), 1);
        assert_eq!(extracted.packages[0].name, "good");
    }

    #[test]
    fn ignored_directories() {
        let archive = archive(&[
            ("root.go", "package root\n"),
            ("testdata/t.go", "package t\n"),
            ("vendor/example.com/v/v.go", "package v\n"),
            ("_examples/e.go", "package e\n"),
            (".hidden/h.go", "package h\n"),
            ("root_test.go", "package root\n"),
        ]);
        let extracted = extract(&archive, &Limits::default()).unwrap();
        let paths: Vec<_> = extracted.packages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec![MODULE]);
        assert!(!extracted.packages[0].redistributable, "no licenses at all");
    }

    #[test]
    fn directory_without_any_build_is_incomplete() {
        let archive = archive(&[
            ("plan9/p.go", "//go:build plan9\n\npackage plan9\n"),
            ("ok/ok.go", "package ok\n"),
        ]);
        let extracted = extract(&archive, &Limits::default()).unwrap();
        assert!(extracted.incomplete);
        assert_eq!(extracted.packages.len(), 1);
    }

    #[test]
    fn rejects_directory_entries() {
        let zip = ZipBuilder::new()
            .directory(format!("{MODULE}@{VERSION}/foo/"))
            .stored(format!("{MODULE}@{VERSION}/foo/foo.go"), b"package foo\n")
            .finish();
        let archive = ModuleArchive::from_bytes(zip, MODULE, VERSION).unwrap();
        let err = extract(&archive, &Limits::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive(_)));
    }

    #[test]
    fn rejects_entries_outside_the_prefix() {
        let zip = ZipBuilder::new()
            .stored(format!("{MODULE}@{VERSION}/foo.go"), b"package foo\n")
            .stored("github.com/other@v1.0.0/bar.go", b"package bar\n")
            .finish();
        let archive = ModuleArchive::from_bytes(zip, MODULE, VERSION).unwrap();
        let err = extract(&archive, &Limits::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive(_)));
    }

    #[test]
    fn no_packages() {
        let archive = archive(&[("LICENSE", MIT), ("README.md", "# hello\n")]);
        let err = extract(&archive, &Limits::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoPackages));
        assert_eq!(err.status(), crate::StatusCode::NotAcceptable);
    }

    #[test]
    fn ceilings() {
        let archive = archive(&[
            ("a/a.go", "package a\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n"),
            ("b/b.go", "package b\n"),
            ("c/c.go", "package c\n"),
        ]);
        let limits = Limits { max_directories: 2, ..Limits::default() };
        assert!(matches!(&*extract(&archive, &limits).unwrap_err(), ErrorKind::TooLarge(_)));
        let limits = Limits { max_packages_per_module: 2, ..Limits::default() };
        assert!(matches!(&*extract(&archive, &limits).unwrap_err(), ErrorKind::TooLarge(_)));
        let limits = Limits { max_imports_per_package: 1, ..Limits::default() };
        assert!(matches!(&*extract(&archive, &limits).unwrap_err(), ErrorKind::TooLarge(_)));
        assert_eq!(extract(&archive, &Limits::default()).unwrap().packages.len(), 3);
    }
}

//! Finding license files inside a module archive.

use exn::ResultExt;
use modfetch_archive::{File, ModuleArchive};
use tracing::instrument;

use crate::classify::classify;
use crate::error::{ErrorKind, Result};
use crate::models::{Coverage, License, Metadata};

/// Basenames (compared case-insensitively) that are treated as license files.
const LICENSE_FILENAMES: &[&str] = &[
    "COPYING",
    "COPYING.md",
    "COPYING.markdown",
    "COPYING.txt",
    "LICENCE",
    "LICENCE.md",
    "LICENCE.markdown",
    "LICENCE.txt",
    "LICENSE",
    "LICENSE.md",
    "LICENSE.markdown",
    "LICENSE.txt",
    "LICENSE.rst",
    "LICENSE.code",
    "LICENSE.docs",
    "LICENSE-2.0.txt",
    "LICENCE-MIT",
    "LICENCE-APACHE",
    "LICENSE-MIT",
    "LICENSE-APACHE",
    "LICENSE-MIT.txt",
    "LICENSE-APACHE.txt",
    "MIT-LICENSE",
    "MIT-LICENSE.md",
    "MIT-LICENSE.txt",
    "MIT_LICENSE",
    "UNLICENSE",
    "UNLICENCE",
];

/// Returns `true` if `name` (a basename) is a recognised license filename.
pub fn is_license_filename(name: &str) -> bool {
    LICENSE_FILENAMES.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Returns `true` if `path` lies inside a vendored package.
///
/// `vendor/LICENSE` describes the vendor directory itself and is kept;
/// `vendor/example.com/pkg/LICENSE` belongs to third-party code and is not.
pub fn is_vendored(path: &str) -> bool {
    let rest = match path.strip_prefix("vendor/") {
        Some(rest) => rest,
        None => match path.find("/vendor/") {
            Some(at) => &path[at + "/vendor/".len()..],
            None => return false,
        },
    };
    rest.contains('/')
}

/// Find and classify every license file in `archive`.
///
/// Files larger than `max_size` are not read; they are still reported (with
/// no types and empty contents) so an operator can see they exist.
#[instrument(skip(archive), fields(prefix = archive.prefix()))]
pub fn detect(archive: &ModuleArchive, max_size: u64) -> Result<Vec<License>> {
    let mut licenses: Vec<License> = Vec::new();
    for file in archive.files().filter(is_candidate) {
        let path = file.path().to_string();
        if file.size() > max_size {
            tracing::warn!(path = %path, size = file.size(), max_size, "license file too large to classify");
            licenses.push(License {
                metadata: Metadata { types: Vec::new(), file_path: path, coverage: Coverage::default() },
                contents: Vec::new(),
            });
            continue;
        }
        let contents = archive.read(&file, max_size).or_raise(|| ErrorKind::Read(path.clone()))?;
        let (types, coverage) = classify(&contents);
        tracing::debug!(path = %path, ?types, coverage = coverage.percent, "classified license file");
        licenses.push(License { metadata: Metadata { types, file_path: path, coverage }, contents });
    }
    licenses.sort_by(|a, b| a.metadata.file_path.cmp(&b.metadata.file_path));
    Ok(licenses)
}

fn is_candidate(file: &File<'_>) -> bool {
    is_license_filename(file.name()) && !is_vendored(file.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modfetch_archive::testing::ZipBuilder;
    use rstest::rstest;

    const MIT: &str = include_str!("../templates/MIT.txt");

    #[rstest]
    #[case("LICENSE", true)]
    #[case("license", true)]
    #[case("License.md", true)]
    #[case("COPYING", true)]
    #[case("LICENCE.txt", true)]
    #[case("LICENSE-APACHE", true)]
    #[case("UNLICENSE", true)]
    #[case("LICENSE.go", false)]
    #[case("README.md", false)]
    #[case("NOTLICENSE", false)]
    fn license_filenames(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_license_filename(name), expected);
    }

    #[rstest]
    #[case("LICENSE", false)]
    #[case("vendor/LICENSE", false)]
    #[case("vendor/pkg/LICENSE", true)]
    #[case("vendor/example.com/pkg/LICENSE", true)]
    #[case("foo/vendor/LICENSE", false)]
    #[case("foo/vendor/pkg/LICENSE", true)]
    #[case("vendored/pkg/LICENSE", false)]
    fn vendored_paths(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_vendored(path), expected);
    }

    #[test]
    fn detects_and_classifies() {
        let data = ZipBuilder::new()
            .stored("m@v1.0.0/LICENSE", MIT.as_bytes())
            .stored("m@v1.0.0/sub/COPYING", b"all yours, no strings")
            .stored("m@v1.0.0/vendor/x/LICENSE", MIT.as_bytes())
            .stored("m@v1.0.0/main.go", b"package main\n")
            .finish();
        let archive = ModuleArchive::from_bytes(data, "m", "v1.0.0").unwrap();
        let licenses = detect(&archive, 1 << 20).unwrap();

        let paths: Vec<_> = licenses.iter().map(|l| l.metadata.file_path.as_str()).collect();
        assert_eq!(paths, vec!["LICENSE", "sub/COPYING"]);
        assert_eq!(licenses[0].metadata.types, vec!["MIT".to_string()]);
        assert!(licenses[1].metadata.types.is_empty());
        assert_eq!(licenses[0].contents, MIT.as_bytes());
    }

    #[test]
    fn oversized_license_is_kept_without_types() {
        let data = ZipBuilder::new().stored("m@v1.0.0/LICENSE", MIT.as_bytes()).finish();
        let archive = ModuleArchive::from_bytes(data, "m", "v1.0.0").unwrap();
        let licenses = detect(&archive, 10).unwrap();
        assert_eq!(licenses.len(), 1);
        assert!(licenses[0].metadata.types.is_empty());
        assert!(licenses[0].contents.is_empty());
    }
}

//! Module-shaped view over a ZIP archive.
//!
//! Every entry of a module archive lives under `<module>@<version>/`. This
//! view strips that prefix so callers work with logical, module-relative
//! paths (`foo/bar.go`, `LICENSE`), and it enforces per-read size limits.

use crate::error::{ErrorKind, Result};
use crate::zip::{Archive, Entry};

/// A file inside a module archive, addressed by its module-relative path.
#[derive(Debug, Clone, Copy)]
pub struct File<'a> {
    path: &'a str,
    entry: &'a Entry,
}

impl<'a> File<'a> {
    /// Path relative to the module root, e.g. `foo/foo.go`.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Directory containing the file, relative to the module root. The root
    /// itself is the empty string.
    pub fn dir(&self) -> &'a str {
        self.path.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    pub fn name(&self) -> &'a str {
        self.path.rsplit_once('/').map_or(self.path, |(_, name)| name)
    }

    pub fn size(&self) -> u64 {
        self.entry.size()
    }

    pub fn entry(&self) -> &'a Entry {
        self.entry
    }
}

/// An archive together with its declared root prefix.
#[derive(Debug, Clone)]
pub struct ModuleArchive {
    archive: Archive,
    prefix: String,
}

impl ModuleArchive {
    /// Wrap `archive`, declaring `<module_path>@<version>/` as its root.
    ///
    /// No validation of individual entries happens here; entries outside the
    /// prefix are simply invisible to [`files`](Self::files) and can be found
    /// through [`entries`](Self::entries) for structural checks.
    pub fn new(archive: Archive, module_path: &str, version: &str) -> Self {
        Self { archive, prefix: format!("{module_path}@{version}/") }
    }

    /// Parse `data` as a ZIP archive and wrap it.
    pub fn from_bytes(data: Vec<u8>, module_path: &str, version: &str) -> Result<Self> {
        Ok(Self::new(Archive::new(data)?, module_path, version))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Raw entries, including any that lack the root prefix.
    pub fn entries(&self) -> &[Entry] {
        self.archive.entries()
    }

    /// Module-relative path of `entry`, or `None` if it lies outside the root.
    pub fn logical_path<'a>(&self, entry: &'a Entry) -> Option<&'a str> {
        entry.name().strip_prefix(self.prefix.as_str()).filter(|path| !path.is_empty())
    }

    /// All non-directory entries under the root prefix, in archive order.
    pub fn files(&self) -> impl Iterator<Item = File<'_>> + '_ {
        self.archive
            .entries()
            .iter()
            .filter(|entry| !entry.is_dir())
            .filter_map(|entry| self.logical_path(entry).map(|path| File { path, entry }))
    }

    /// Find a file by module-relative path.
    pub fn file(&self, path: &str) -> Option<File<'_>> {
        self.files().find(|file| file.path == path)
    }

    /// Read the contents of `file`, refusing anything larger than `limit`.
    pub fn read(&self, file: &File<'_>, limit: u64) -> Result<Vec<u8>> {
        self.archive.read(file.entry, limit)
    }

    /// Read a file by module-relative path.
    pub fn read_path(&self, path: &str, limit: u64) -> Result<Vec<u8>> {
        let Some(file) = self.file(path) else {
            exn::bail!(ErrorKind::NotFound(path.to_string()));
        };
        self.read(&file, limit)
    }
}

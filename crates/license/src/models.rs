use serde::{Deserialize, Serialize};

/// A single license template that matched a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// License identifier, e.g. `MIT` or `BSD-3-Clause`.
    pub id: String,
    /// Percentage of the template's text found in the file.
    pub percent: f64,
}

/// How much of a license file was explained by known license texts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    /// Percentage of the file's words covered by the matches below.
    pub percent: f64,
    pub matches: Vec<Match>,
}

/// Everything known about one license file, minus its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Detected license identifiers. Empty when the file could not be
    /// classified with enough confidence (or was too big to read).
    pub types: Vec<String>,
    /// Path of the license file relative to the module root.
    pub file_path: String,
    pub coverage: Coverage,
}

impl Metadata {
    /// Directory the license applies from, `.` for the module root.
    pub fn dir(&self) -> &str {
        match self.file_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => ".",
        }
    }

    /// Returns `true` if the license sits at the module root.
    pub fn is_root(&self) -> bool {
        self.dir() == "."
    }
}

/// A detected license file and its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub metadata: Metadata,
    /// Raw file contents. Empty for files that exceeded the size limit.
    pub contents: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("LICENSE", ".")]
    #[case("foo/LICENSE", "foo")]
    #[case("foo/bar/COPYING", "foo/bar")]
    fn metadata_dir(#[case] path: &str, #[case] dir: &str) {
        let metadata = Metadata { types: vec![], file_path: path.to_string(), coverage: Coverage::default() };
        assert_eq!(metadata.dir(), dir);
        assert_eq!(metadata.is_root(), dir == ".");
    }
}

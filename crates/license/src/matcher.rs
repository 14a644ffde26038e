//! Directory to license index.

use std::collections::BTreeMap;

use crate::models::Metadata;

/// Answers "which licenses apply to this directory?".
///
/// A license at directory `D` applies to `D` and all of its descendants, never
/// to an ancestor or a sibling. Built once per archive and read-only after.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    by_dir: BTreeMap<String, Vec<Metadata>>,
}

impl Matcher {
    pub fn new(metadata: impl IntoIterator<Item = Metadata>) -> Self {
        let mut by_dir: BTreeMap<String, Vec<Metadata>> = BTreeMap::new();
        for m in metadata {
            by_dir.entry(m.dir().to_string()).or_default().push(m);
        }
        for list in by_dir.values_mut() {
            list.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        }
        Self { by_dir }
    }

    /// Licenses applying to `dir`, nearest-to-root first.
    ///
    /// `dir` is module-relative; `""` and `"."` both mean the module root.
    /// Absolute paths and paths that try to escape the module match nothing.
    pub fn matches(&self, dir: &str) -> Vec<Metadata> {
        let Some(ancestors) = ancestors(dir) else {
            return Vec::new();
        };
        ancestors.iter().filter_map(|d| self.by_dir.get(d.as_str())).flatten().cloned().collect()
    }

    /// Licenses located exactly at the module root.
    pub fn root(&self) -> &[Metadata] {
        self.by_dir.get(".").map(Vec::as_slice).unwrap_or_default()
    }

    /// Every license the matcher knows about, in directory order.
    pub fn all(&self) -> impl Iterator<Item = &Metadata> {
        self.by_dir.values().flatten()
    }
}

/// `"."` followed by every prefix of `dir` on element boundaries, ending with
/// `dir` itself. `None` for inputs that must not match anything.
fn ancestors(dir: &str) -> Option<Vec<String>> {
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    if dir.starts_with('/') {
        return None;
    }
    let mut out = vec![".".to_string()];
    if dir.is_empty() || dir == "." {
        return Some(out);
    }
    let mut current = String::new();
    for element in dir.trim_end_matches('/').split('/') {
        if element.is_empty() || element == "." || element == ".." {
            return None;
        }
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(element);
        out.push(current.clone());
    }
    Some(out)
}

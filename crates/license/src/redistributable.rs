//! Redistributability decisions.

use std::collections::BTreeMap;

use crate::models::Metadata;

/// License types that allow the source to be redistributed and displayed.
const REDISTRIBUTABLE_TYPES: &[&str] =
    &["Apache-2.0", "BSD-2-Clause", "BSD-3-Clause", "BSL-1.0", "ISC", "MIT", "Unlicense", "Zlib"];

pub fn is_redistributable_type(id: &str) -> bool {
    REDISTRIBUTABLE_TYPES.contains(&id)
}

/// Returns `true` if a license file grants redistribution on its own.
pub fn grants_redistribution(license: &Metadata) -> bool {
    license.types.iter().any(|id| is_redistributable_type(id))
}

/// Decide whether content covered by `licenses` may be redistributed.
///
/// Two conditions must hold:
/// - at least one license sits at the module root, and
/// - every directory that carries licenses carries at least one that grants
///   redistribution.
///
/// An unrecognised file next to a recognised one in the same directory does
/// not spoil the result. A directory holding only unrecognised licenses does,
/// since the root license cannot be assumed to cover it.
pub fn is_redistributable(licenses: &[Metadata]) -> bool {
    let mut by_dir: BTreeMap<&str, bool> = BTreeMap::new();
    for license in licenses {
        *by_dir.entry(license.dir()).or_default() |= grants_redistribution(license);
    }
    by_dir.contains_key(".") && by_dir.values().all(|granted| *granted)
}

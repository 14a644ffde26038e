//! Reading module archives.
//!
//! A module proxy serves each module version as a ZIP file whose entries all
//! live under `<module>@<version>/`. [`Archive`] parses the container itself;
//! [`ModuleArchive`] layers the root prefix on top and hands out files by
//! their module-relative path with size limits enforced on every read.

pub mod error;
mod module;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod zip;

pub use crate::module::{File, ModuleArchive};
pub use crate::zip::{Archive, Entry, Method};

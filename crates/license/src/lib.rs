//! License detection and matching for module archives.
//!
//! - [`detect`] scans an archive for license files and classifies them.
//! - [`Matcher`] indexes the results by directory so the licenses applying
//!   to any package directory can be looked up.
//! - [`is_redistributable`] decides whether a set of licenses lets the
//!   covered content be redistributed.

mod classify;
mod detect;
pub mod error;
mod matcher;
mod models;
mod redistributable;

pub use crate::classify::{COVERAGE_THRESHOLD, MATCH_THRESHOLD, classify, known_types};
pub use crate::detect::{detect, is_license_filename, is_vendored};
pub use crate::matcher::Matcher;
pub use crate::models::{Coverage, License, Match, Metadata};
pub use crate::redistributable::{grants_redistribution, is_redistributable, is_redistributable_type};

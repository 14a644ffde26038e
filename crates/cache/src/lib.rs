//! SQLite persistence for the module ingestion pipeline.
//!
//! Two kinds of data live here:
//! - **Version state**: one row per `(module, version)` that was ever enqueued
//!   or attempted, recording the last status, try count and when the version
//!   is next eligible for a retry.
//! - **Module data**: the module version, its packages (one row per import
//!   path and build context) and its licenses. These are replaced as a unit
//!   whenever the same version is fetched again, and deleted when the proxy
//!   reports the version gone.
//!
//! Search documents and alternative module paths are small side tables kept
//! consistent with the module data.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{SearchDocument, VersionState, VersionStateUpdate, retry_delay};
pub use crate::repo::Repository;

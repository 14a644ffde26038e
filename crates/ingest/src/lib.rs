//! The module ingestion pipeline.
//!
//! - [`TaskQueue`] accepts `(module, version)` work and runs a bounded number
//!   of fetches at once.
//! - [`Fetcher`] drives one fetch: resolve the version through a
//!   [`ProxyClient`], download and process the archive, store the result
//!   through [`Persistence`] and record the outcome as a [`StatusCode`].
//! - [`extract_packages`] turns an archive into packages, one per directory
//!   and distinct build.

pub mod error;
mod fetch;
mod persist;
mod process;
pub mod proxy;
mod queue;
mod status;

pub use crate::error::{FetchError, Phase};
pub use crate::fetch::{Exclusions, Fetcher, LATEST};
pub use crate::persist::Persistence;
pub use crate::process::{Extracted, extract_packages};
pub use crate::proxy::{ProxyClient, VersionInfo};
pub use crate::queue::{TaskQueue, WorkItem};
pub use crate::status::StatusCode;

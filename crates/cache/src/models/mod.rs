mod license;
mod module;
mod package;
mod search;
mod state;

pub(crate) use self::license::LicenseRow;
pub(crate) use self::module::ModuleRow;
pub(crate) use self::package::PackageRow;
pub use self::search::SearchDocument;
pub(crate) use self::search::SearchDocumentRow;
pub use self::state::{VersionState, VersionStateUpdate, retry_delay};
pub(crate) use self::state::{MAX_BACKOFF_EXPONENT, VersionStateRow};

use exn::ResultExt;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind};

fn timestamp(value: i64, field: &'static str) -> Result<UtcDateTime, Error> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}

use exn::ResultExt;
use time::{Duration, UtcDateTime};

use super::timestamp;
use crate::error::{Error, ErrorKind};

/// Longest backoff exponent: retries settle at 2^10 minutes (about 17 hours).
pub(crate) const MAX_BACKOFF_EXPONENT: u32 = 10;

/// How long to wait before retrying a version that has failed `tries` times.
pub fn retry_delay(tries: u32) -> Duration {
    Duration::minutes(1_i64 << tries.min(MAX_BACKOFF_EXPONENT))
}

/// Durable fetch state of one module version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionState {
    pub module_path: String,
    pub version: String,
    /// Status of the last attempt; `0` if never attempted.
    pub status: u16,
    pub error: Option<String>,
    pub try_count: u32,
    /// Module path declared by the archive's `go.mod`, when known.
    pub go_mod_path: Option<String>,
    pub index_timestamp: UtcDateTime,
    pub created_at: UtcDateTime,
    pub last_processed_at: Option<UtcDateTime>,
    pub next_processed_after: UtcDateTime,
}

/// The outcome of one fetch attempt, to be folded into [`VersionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStateUpdate {
    pub module_path: String,
    pub version: String,
    pub timestamp: UtcDateTime,
    pub status: u16,
    pub error: Option<String>,
    pub go_mod_path: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionStateRow {
    pub(crate) module_path: String,
    pub(crate) version: String,
    pub(crate) status: i64,
    pub(crate) error: Option<String>,
    pub(crate) try_count: i64,
    pub(crate) go_mod_path: Option<String>,
    pub(crate) index_timestamp: i64,
    pub(crate) created_at: i64,
    pub(crate) last_processed_at: Option<i64>,
    pub(crate) next_processed_after: i64,
}

impl TryFrom<VersionStateRow> for VersionState {
    type Error = Error;
    fn try_from(row: VersionStateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            module_path: row.module_path,
            version: row.version,
            status: u16::try_from(row.status).or_raise(|| ErrorKind::InvalidData("status"))?,
            error: row.error,
            try_count: u32::try_from(row.try_count).or_raise(|| ErrorKind::InvalidData("try count"))?,
            go_mod_path: row.go_mod_path,
            index_timestamp: timestamp(row.index_timestamp, "index timestamp")?,
            created_at: timestamp(row.created_at, "created at")?,
            last_processed_at: row
                .last_processed_at
                .map(|t| timestamp(t, "last processed at"))
                .transpose()?,
            next_processed_after: timestamp(row.next_processed_after, "next processed after")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(3, 8)]
    #[case(10, 1024)]
    #[case(25, 1024)]
    fn backoff_is_capped(#[case] tries: u32, #[case] minutes: i64) {
        assert_eq!(retry_delay(tries), Duration::minutes(minutes));
    }

    #[test]
    fn test_row_to_model() {
        let now = UtcDateTime::now().unix_timestamp();
        let row = VersionStateRow {
            module_path: "github.com/my/module".to_string(),
            version: "v1.0.0".to_string(),
            status: 502,
            error: Some("proxy unavailable".to_string()),
            try_count: 2,
            go_mod_path: None,
            index_timestamp: now,
            created_at: now,
            last_processed_at: Some(now),
            next_processed_after: now + 240,
        };
        let state = VersionState::try_from(row).unwrap();
        assert_eq!(state.status, 502);
        assert_eq!(state.try_count, 2);
        assert_eq!(state.next_processed_after.unix_timestamp(), now + 240);
    }

    #[test]
    fn test_negative_status_is_rejected() {
        let row = VersionStateRow {
            module_path: "github.com/my/module".to_string(),
            version: "v1.0.0".to_string(),
            status: -1,
            error: None,
            try_count: 0,
            go_mod_path: None,
            index_timestamp: 0,
            created_at: 0,
            last_processed_at: None,
            next_processed_after: 0,
        };
        let err = VersionState::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("status")));
    }
}

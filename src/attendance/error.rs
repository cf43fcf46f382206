use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use super::entities::{Action, SessionStatus};

/// Underlying cause of a storage failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("failed to read {key}: {source}")]
    StorageRead {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to write {key}: {source}")]
    StorageWrite {
        key: String,
        #[source]
        source: BoxError,
    },
    /// Lists every key that could not be removed. Keys not listed were removed.
    #[error("failed to remove {}: {source}", .keys.join(", "))]
    StorageDelete {
        keys: Vec<String>,
        #[source]
        source: BoxError,
    },
    #[error("worked time is negative: from {from} to {to}")]
    InvalidDuration { from: NaiveTime, to: NaiveTime },
    #[error("can't {action} while {status}")]
    InvalidTransition {
        action: Action,
        status: SessionStatus,
    },
    #[error("can't clock in for {record} on {today}")]
    DateMismatch { record: NaiveDate, today: NaiveDate },
    #[error("record for {date} is being changed by another session")]
    RecordBusy { date: NaiveDate },
}

impl AttendanceError {
    /// Storage failures are reported to the user without aborting. Everything else means the
    /// requested action didn't happen.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            AttendanceError::StorageRead { .. }
                | AttendanceError::StorageWrite { .. }
                | AttendanceError::StorageDelete { .. }
        )
    }
}

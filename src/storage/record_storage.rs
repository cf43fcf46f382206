use anyhow::anyhow;
use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};

use crate::{
    attendance::{
        entities::{BreakInterval, DailyAttendanceRecord},
        error::AttendanceError,
    },
    utils::time::{date_to_record_name, format_storage_time, parse_storage_time},
};

use super::key_value::{KeyValueStore, StoreLock};

pub fn clock_in_key(date: NaiveDate) -> String {
    format!("clockIn_{}", date_to_record_name(date))
}

pub fn clock_out_key(date: NaiveDate) -> String {
    format!("clockOut_{}", date_to_record_name(date))
}

pub fn breaks_key(date: NaiveDate) -> String {
    format!("breaks_{}", date_to_record_name(date))
}

pub fn lock_name(date: NaiveDate) -> String {
    format!("day_{}", date_to_record_name(date))
}

/// Clock-in and clock-out of a day, without breaks. That's all the weekly view needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub clock_in_time: Option<NaiveTime>,
    pub clock_out_time: Option<NaiveTime>,
}

/// Persists [DailyAttendanceRecord]s on top of a [KeyValueStore]. Each field has its own key, so
/// an action only rewrites what it changed.
pub struct AttendanceStorage<S> {
    store: S,
}

impl<S: KeyValueStore> AttendanceStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn read(&self, key: &str) -> Result<Option<String>, AttendanceError> {
        self.store
            .get(key)
            .await
            .map_err(|e| AttendanceError::StorageRead {
                key: key.to_owned(),
                source: e.into(),
            })
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AttendanceError> {
        debug!("Saving {key} = {value}");
        self.store
            .set(key, value)
            .await
            .map_err(|e| AttendanceError::StorageWrite {
                key: key.to_owned(),
                source: e.into(),
            })
    }

    async fn read_time(&self, key: &str) -> Result<Option<NaiveTime>, AttendanceError> {
        self.read(key)
            .await?
            .map(|v| {
                parse_storage_time(v.trim()).map_err(|e| AttendanceError::StorageRead {
                    key: key.to_owned(),
                    source: e.into(),
                })
            })
            .transpose()
    }

    async fn read_breaks(&self, key: &str) -> Result<Vec<BreakInterval>, AttendanceError> {
        let Some(value) = self.read(key).await? else {
            return Ok(vec![]);
        };
        serde_json::from_str(&value).map_err(|e| AttendanceError::StorageRead {
            key: key.to_owned(),
            source: e.into(),
        })
    }

    /// Claims the record of `date` for one read-modify-write. Fails with
    /// [AttendanceError::RecordBusy] instead of waiting when someone else holds it.
    pub async fn lock(&self, date: NaiveDate) -> Result<StoreLock, AttendanceError> {
        let name = lock_name(date);
        match self.store.try_lock(&name).await {
            Ok(Some(lock)) => Ok(lock),
            Ok(None) => Err(AttendanceError::RecordBusy { date }),
            Err(e) => Err(AttendanceError::StorageWrite {
                key: name,
                source: e.into(),
            }),
        }
    }

    /// Loads whatever has been stored for `date`. Absent keys produce an empty record.
    pub async fn load(&self, date: NaiveDate) -> Result<DailyAttendanceRecord, AttendanceError> {
        let record = DailyAttendanceRecord {
            date,
            clock_in_time: self.read_time(&clock_in_key(date)).await?,
            clock_out_time: self.read_time(&clock_out_key(date)).await?,
            breaks: self.read_breaks(&breaks_key(date)).await?,
        };

        if !record.has_consistent_breaks() {
            return Err(AttendanceError::StorageRead {
                key: breaks_key(date),
                source: anyhow!("Only the last break can be open").into(),
            });
        }
        if record.clock_in_time.is_none() && record.clock_out_time.is_some() {
            // Can only be produced by a partially failed clear. Reported, but still usable.
            warn!("Record for {date} has a clock out without a clock in");
        }
        Ok(record)
    }

    pub async fn load_summary(&self, date: NaiveDate) -> Result<DaySummary, AttendanceError> {
        Ok(DaySummary {
            date,
            clock_in_time: self.read_time(&clock_in_key(date)).await?,
            clock_out_time: self.read_time(&clock_out_key(date)).await?,
        })
    }

    pub async fn save_clock_in(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<(), AttendanceError> {
        self.write(&clock_in_key(date), &format_storage_time(time))
            .await
    }

    pub async fn save_clock_out(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<(), AttendanceError> {
        self.write(&clock_out_key(date), &format_storage_time(time))
            .await
    }

    pub async fn save_breaks(
        &self,
        date: NaiveDate,
        breaks: &[BreakInterval],
    ) -> Result<(), AttendanceError> {
        let key = breaks_key(date);
        let value = serde_json::to_string(breaks).map_err(|e| AttendanceError::StorageWrite {
            key: key.clone(),
            source: e.into(),
        })?;
        self.write(&key, &value).await
    }

    /// Removes all the keys of `date`. Every removal is attempted even if an earlier one failed,
    /// and the error names each key that is still present.
    pub async fn clear(&self, date: NaiveDate) -> Result<(), AttendanceError> {
        let mut failed = vec![];
        let mut last_error = None;
        for key in [clock_in_key(date), clock_out_key(date), breaks_key(date)] {
            if let Err(e) = self.store.remove(&key).await {
                warn!("Failed to remove {key}: {e:?}");
                failed.push(key);
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) => Err(AttendanceError::StorageDelete {
                keys: failed,
                source: e.into(),
            }),
        }
    }
}

//! Weekly overview. A week starts on Sunday, only Monday to Friday are listed.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::{
    attendance::error::AttendanceError,
    storage::{
        key_value::KeyValueStore,
        record_storage::{AttendanceStorage, DaySummary},
    },
};

const CONCURRENT_DAY_LOADS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkWeek {
    /// Counted from the first day of the month, starting with 1.
    pub week_of_month: u32,
    /// Sunday.
    pub start: NaiveDate,
    /// Saturday.
    pub end: NaiveDate,
    /// Monday through Friday.
    pub days: Vec<NaiveDate>,
}

impl WorkWeek {
    pub fn containing(today: NaiveDate) -> Self {
        let start = today
            .checked_sub_days(Days::new(today.weekday().num_days_from_sunday().into()))
            .unwrap_or(today);
        let days = start
            .iter_days()
            .take(7)
            .filter(|v| !matches!(v.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();

        Self {
            week_of_month: today.day0().div_ceil(7) + 1,
            start,
            end: start.checked_add_days(Days::new(6)).unwrap_or(start),
            days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimesheetRow {
    pub summary: DaySummary,
    /// Only the current day can be changed.
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timesheet {
    pub week: WorkWeek,
    pub rows: Vec<TimesheetRow>,
}

/// Reads the work week around `today`. Rows come back in calendar order.
pub async fn load_week<S: KeyValueStore>(
    storage: &AttendanceStorage<S>,
    today: NaiveDate,
) -> Result<Timesheet, AttendanceError> {
    let week = WorkWeek::containing(today);
    debug!("Loading week {} - {}", week.start, week.end);

    let rows = stream::iter(week.days.clone())
        .map(|day| storage.load_summary(day))
        .buffered(CONCURRENT_DAY_LOADS)
        .map_ok(|summary| TimesheetRow {
            interactive: summary.date == today,
            summary,
        })
        .try_collect()
        .await?;

    Ok(Timesheet { week, rows })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveTime};

    use crate::storage::{key_value::MemoryKeyValueStore, record_storage::AttendanceStorage};

    use super::{load_week, WorkWeek};

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    #[test]
    fn test_week_of_a_weekday() {
        let week = WorkWeek::containing(date(10, 21));
        assert_eq!(week.start, date(10, 18));
        assert_eq!(week.end, date(10, 24));
        assert_eq!(
            week.days,
            (19..=23).map(|d| date(10, d)).collect::<Vec<_>>()
        );
        assert_eq!(week.week_of_month, 4);
    }

    #[test]
    fn test_week_starts_on_sunday() {
        assert_eq!(WorkWeek::containing(date(10, 18)).days[0], date(10, 19));
        assert_eq!(WorkWeek::containing(date(10, 24)).days[4], date(10, 23));
    }

    #[test]
    fn test_week_crossing_months() {
        let week = WorkWeek::containing(date(10, 1));
        assert_eq!(week.start, date(9, 27));
        assert_eq!(week.days[0], date(9, 28));
        assert_eq!(week.days[4], date(10, 2));
        assert_eq!(week.week_of_month, 1);
    }

    #[tokio::test]
    async fn test_load_week() -> Result<()> {
        let storage = AttendanceStorage::new(MemoryKeyValueStore::default());
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        storage.save_clock_in(date(10, 19), nine).await?;
        storage.save_clock_out(date(10, 19), five).await?;
        storage.save_clock_in(date(10, 20), nine).await?;
        // Weekend entries are never listed.
        storage.save_clock_in(date(10, 24), nine).await?;

        let sheet = load_week(&storage, date(10, 20)).await?;
        assert_eq!(sheet.rows.len(), 5);

        let interactive = sheet
            .rows
            .iter()
            .filter(|v| v.interactive)
            .map(|v| v.summary.date)
            .collect::<Vec<_>>();
        assert_eq!(interactive, vec![date(10, 20)]);

        assert_eq!(sheet.rows[0].summary.clock_out_time, Some(five));
        assert_eq!(sheet.rows[1].summary.clock_in_time, Some(nine));
        assert_eq!(sheet.rows[1].summary.clock_out_time, None);
        assert!(sheet.rows[2..].iter().all(|v| v.summary.clock_in_time.is_none()));
        Ok(())
    }
}

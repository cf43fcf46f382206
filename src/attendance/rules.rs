use std::fmt::Display;

use chrono::{Duration, NaiveDateTime, NaiveTime};

use crate::utils::time::truncate_to_seconds;

use super::{
    entities::{Action, BreakInterval, DailyAttendanceRecord, SessionStatus},
    error::AttendanceError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockInOutcome {
    pub record: DailyAttendanceRecord,
    pub is_late: bool,
}

/// The record is returned even when a warning is raised. Whoever asked for the clock-out decides
/// whether it's kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockOutOutcome {
    pub record: DailyAttendanceRecord,
    pub is_early: bool,
    pub precedes_clock_in: bool,
}

impl ClockOutOutcome {
    pub fn needs_confirmation(&self) -> bool {
        self.is_early || self.precedes_clock_in
    }
}

fn ensure_status(
    record: &DailyAttendanceRecord,
    action: Action,
    allowed: &[SessionStatus],
) -> Result<(), AttendanceError> {
    let status = record.status();
    if allowed.contains(&status) {
        Ok(())
    } else {
        Err(AttendanceError::InvalidTransition { action, status })
    }
}

/// Clock-in is only possible once, and only on the record's own date.
pub fn record_clock_in(
    record: &DailyAttendanceRecord,
    now: NaiveDateTime,
    expected_clock_in: NaiveTime,
) -> Result<ClockInOutcome, AttendanceError> {
    ensure_status(record, Action::ClockIn, &[SessionStatus::NotStarted])?;
    if now.date() != record.date {
        return Err(AttendanceError::DateMismatch {
            record: record.date,
            today: now.date(),
        });
    }

    let time = truncate_to_seconds(now.time());
    Ok(ClockInOutcome {
        record: DailyAttendanceRecord {
            clock_in_time: Some(time),
            ..record.clone()
        },
        is_late: time > expected_clock_in,
    })
}

/// Clocking out while on break is allowed. The break stays open and is accounted up to the
/// clock-out by [total_worked_duration].
pub fn record_clock_out(
    record: &DailyAttendanceRecord,
    now: NaiveDateTime,
    expected_clock_out: NaiveTime,
) -> Result<ClockOutOutcome, AttendanceError> {
    ensure_status(
        record,
        Action::ClockOut,
        &[SessionStatus::ClockedIn, SessionStatus::OnBreak],
    )?;

    let time = truncate_to_seconds(now.time());
    Ok(ClockOutOutcome {
        precedes_clock_in: record.clock_in_time.is_some_and(|v| time < v),
        is_early: time < expected_clock_out,
        record: DailyAttendanceRecord {
            clock_out_time: Some(time),
            ..record.clone()
        },
    })
}

pub fn start_break(
    record: &DailyAttendanceRecord,
    now: NaiveDateTime,
    note: &str,
) -> Result<DailyAttendanceRecord, AttendanceError> {
    ensure_status(record, Action::StartBreak, &[SessionStatus::ClockedIn])?;

    let mut record = record.clone();
    record
        .breaks
        .push(BreakInterval::open(truncate_to_seconds(now.time()), note));
    Ok(record)
}

pub fn end_break(
    record: &DailyAttendanceRecord,
    now: NaiveDateTime,
) -> Result<DailyAttendanceRecord, AttendanceError> {
    ensure_status(record, Action::EndBreak, &[SessionStatus::OnBreak])?;

    let mut record = record.clone();
    if let Some(open) = record.breaks.last_mut() {
        open.end = Some(truncate_to_seconds(now.time()));
    }
    Ok(record)
}

/// Time worked over a finished day, truncated to whole minutes when displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkedDuration(Duration);

impl WorkedDuration {
    pub fn hours(&self) -> i64 {
        self.0.num_hours()
    }

    pub fn minutes(&self) -> i64 {
        self.0.num_minutes() % 60
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Display for WorkedDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h {}m", self.hours(), self.minutes())
    }
}

/// `"-"` stands for a day that isn't finished yet.
pub fn format_worked(worked: Option<WorkedDuration>) -> String {
    worked
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".into())
}

/// Clock-out minus clock-in minus breaks. A break that was never closed counts until clock-out.
/// `None` until both clock-in and clock-out exist.
pub fn total_worked_duration(
    record: &DailyAttendanceRecord,
) -> Result<Option<WorkedDuration>, AttendanceError> {
    let (Some(clock_in), Some(clock_out)) = (record.clock_in_time, record.clock_out_time) else {
        return Ok(None);
    };
    if clock_out < clock_in {
        return Err(AttendanceError::InvalidDuration {
            from: clock_in,
            to: clock_out,
        });
    }

    let mut worked = clock_out - clock_in;
    for interval in &record.breaks {
        let taken = match interval.end {
            Some(end) if end < interval.start => {
                return Err(AttendanceError::InvalidDuration {
                    from: interval.start,
                    to: end,
                });
            }
            Some(end) => end - interval.start,
            None => (clock_out - interval.start).max(Duration::zero()),
        };
        worked -= taken;
    }

    if worked < Duration::zero() {
        return Err(AttendanceError::InvalidDuration {
            from: clock_in,
            to: clock_out,
        });
    }
    Ok(Some(WorkedDuration(worked)))
}

/// Work time accumulated so far. Breaks are excluded, so the value stands still during a break
/// and after clock-out. `None` before clock-in.
pub fn elapsed_since_clock_in(
    record: &DailyAttendanceRecord,
    now: NaiveDateTime,
) -> Option<Duration> {
    let clock_in = record.date.and_time(record.clock_in_time?);
    let until = record
        .clock_out_time
        .map(|v| record.date.and_time(v))
        .unwrap_or(now);

    let on_break = record
        .breaks
        .iter()
        .map(|interval| {
            let start = record.date.and_time(interval.start);
            let end = interval
                .end
                .map(|v| record.date.and_time(v))
                .unwrap_or(until)
                .min(until);
            (end - start).max(Duration::zero())
        })
        .fold(Duration::zero(), |acc, v| acc + v);

    Some((until - clock_in - on_break).max(Duration::zero()))
}

use std::fmt::Display;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::utils::time::{hms, hms_option};

/// A single break. Missing `end` means the break is still going on.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct BreakInterval {
    #[serde(with = "hms")]
    pub start: NaiveTime,
    #[serde(with = "hms_option", default)]
    pub end: Option<NaiveTime>,
    #[serde(default)]
    pub note: String,
}

impl BreakInterval {
    pub fn open(start: NaiveTime, note: impl Into<String>) -> Self {
        Self {
            start,
            end: None,
            note: note.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Everything recorded for one calendar date. Fields are only changed through
/// [rules](super::rules).
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct DailyAttendanceRecord {
    pub date: NaiveDate,
    pub clock_in_time: Option<NaiveTime>,
    pub clock_out_time: Option<NaiveTime>,
    /// Chronological. Only the last one may be open.
    pub breaks: Vec<BreakInterval>,
}

impl DailyAttendanceRecord {
    /// Creates a record in the [SessionStatus::NotStarted] state.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            clock_in_time: None,
            clock_out_time: None,
            breaks: vec![],
        }
    }

    pub fn open_break(&self) -> Option<&BreakInterval> {
        self.breaks.last().filter(|v| v.is_open())
    }

    /// Checks that no break other than the last one is open.
    pub fn has_consistent_breaks(&self) -> bool {
        let Some((_, closed)) = self.breaks.split_last() else {
            return true;
        };
        closed.iter().all(|v| !v.is_open())
    }

    pub fn status(&self) -> SessionStatus {
        match (self.clock_in_time, self.clock_out_time) {
            (None, _) => SessionStatus::NotStarted,
            (Some(_), Some(_)) => SessionStatus::ClockedOut,
            (Some(_), None) if self.open_break().is_some() => SessionStatus::OnBreak,
            (Some(_), None) => SessionStatus::ClockedIn,
        }
    }
}

/// Phase of a day. Derived from a record, never stored.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SessionStatus {
    NotStarted,
    ClockedIn,
    OnBreak,
    ClockedOut,
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::NotStarted => write!(f, "not started"),
            SessionStatus::ClockedIn => write!(f, "clocked in"),
            SessionStatus::OnBreak => write!(f, "on break"),
            SessionStatus::ClockedOut => write!(f, "clocked out"),
        }
    }
}

/// Actions that change a record. Used for reporting rejected transitions.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Action {
    ClockIn,
    ClockOut,
    StartBreak,
    EndBreak,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::ClockIn => write!(f, "clock in"),
            Action::ClockOut => write!(f, "clock out"),
            Action::StartBreak => write!(f, "start a break"),
            Action::EndBreak => write!(f, "end a break"),
        }
    }
}

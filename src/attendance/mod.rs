//! Daily attendance accounting.
//!  - [entities::DailyAttendanceRecord] describes one calendar date: clock-in, clock-out and the
//!    breaks taken in between.
//!  - [rules] holds every transition and derivation over a record. It is pure, storage and
//!    presentation live elsewhere.
//!  - [error::AttendanceError] is the error taxonomy shared by rules and storage.

pub mod entities;
pub mod error;
pub mod rules;

//! Time sheet for a single worker. Records when the day started and ended and which breaks were
//! taken in between, then derives worked hours from it. Everything is kept in a local directory,
//! one file per stored value.
//!

pub mod attendance;
pub mod cli;
pub mod session;
pub mod storage;
pub mod timesheet;
pub mod utils;

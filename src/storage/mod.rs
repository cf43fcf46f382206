//!  Storage is organized in two layers.
//!   - [key_value::KeyValueStore] is a plain string store with asynchronous get/set/remove. The
//!     main realization keeps a file per key inside a directory.
//!   - [record_storage::AttendanceStorage] maps a [DailyAttendanceRecord] onto three keys per date:
//!     `clockIn_<date>`, `clockOut_<date>` and `breaks_<date>`.
//!
//! [DailyAttendanceRecord]: crate::attendance::entities::DailyAttendanceRecord

pub mod key_value;
pub mod record_storage;

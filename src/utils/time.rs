use chrono::{Duration, NaiveDate, NaiveTime, Timelike};

/// Format of a stored time of day. Every time value that reaches the storage goes through it.
pub const STORAGE_TIME_FORMAT: &str = "%H:%M:%S";
const RECORD_DATE_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a string in clockin. Storage keys are built
/// from it.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format(RECORD_DATE_FORMAT).to_string()
}

pub fn parse_record_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value, RECORD_DATE_FORMAT)
}

pub fn format_storage_time(time: NaiveTime) -> String {
    time.format(STORAGE_TIME_FORMAT).to_string()
}

pub fn parse_storage_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, STORAGE_TIME_FORMAT)
}

/// Accepts both `HH:MM` and `HH:MM:SS`. Used for user supplied expectations.
pub fn parse_time_argument(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, STORAGE_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
}

/// Drops sub-second precision so that a value kept in memory compares equal to the same value
/// after it went through storage.
pub fn truncate_to_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// `9:05 AM`
pub fn display_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// `9:05:12 AM`
pub fn display_time_with_seconds(time: NaiveTime) -> String {
    time.format("%-I:%M:%S %p").to_string()
}

pub fn display_optional_time(time: Option<NaiveTime>) -> String {
    time.map(display_time).unwrap_or_else(|| "-".into())
}

/// `Monday, October 19, 2026`
pub fn display_heading(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Live counter format, `01:02:03`. Negative values are shown as zero.
pub fn format_elapsed(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}

/// Serializes [NaiveTime] as `HH:mm:ss`.
pub mod hms {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_storage_time(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_storage_time(&s).map_err(serde::de::Error::custom)
    }
}

/// Same as [hms], for values that might be absent. Absence is stored as `null`.
pub mod hms_option {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(time) => serializer.serialize_str(&super::format_storage_time(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse_storage_time(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime};

    use super::*;

    #[test]
    fn test_display_formats() {
        let time = NaiveTime::from_hms_opt(13, 5, 9).unwrap();
        assert_eq!(display_time(time), "1:05 PM");
        assert_eq!(display_time_with_seconds(time), "1:05:09 PM");
        assert_eq!(display_optional_time(None), "-");
        assert_eq!(
            display_heading(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()),
            "Monday, October 19, 2026"
        );
    }

    #[test]
    fn test_time_argument_accepts_minutes_precision() {
        assert_eq!(
            parse_time_argument("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time_argument("09:30:15").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 15).unwrap()
        );
        assert!(parse_time_argument("half past nine").is_err());
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::seconds(3723)), "01:02:03");
        assert_eq!(format_elapsed(Duration::seconds(-5)), "00:00:00");
    }

    #[test]
    fn test_truncate_to_seconds() {
        let time = NaiveTime::from_hms_milli_opt(9, 0, 1, 999).unwrap();
        assert_eq!(
            truncate_to_seconds(time),
            NaiveTime::from_hms_opt(9, 0, 1).unwrap()
        );
    }
}

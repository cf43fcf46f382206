use std::fmt::Write as _;

use anyhow::Result;
use chrono::NaiveDate;

use crate::{
    storage::{key_value::KeyValueStore, record_storage::AttendanceStorage},
    timesheet::{load_week, Timesheet},
    utils::time::display_optional_time,
};

pub async fn print_week<S: KeyValueStore>(
    storage: &AttendanceStorage<S>,
    today: NaiveDate,
) -> Result<()> {
    let sheet = load_week(storage, today).await?;
    println!("{}", render_week(&sheet));
    Ok(())
}

/// Today's row is marked with `>`. It's the only one that can be changed.
pub fn render_week(sheet: &Timesheet) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Week {}\t{} - {}",
        sheet.week.week_of_month,
        sheet.week.start.format("%B %-d"),
        sheet.week.end.format("%B %-d")
    );
    let _ = writeln!(out, "Timesheets");
    for row in &sheet.rows {
        let _ = writeln!(
            out,
            "{} {:<9} {:<12} Clock In: {:<8}  Clock Out: {}",
            if row.interactive { ">" } else { " " },
            row.summary.date.format("%A").to_string(),
            row.summary.date.format("%B %-d").to_string(),
            display_optional_time(row.summary.clock_in_time),
            display_optional_time(row.summary.clock_out_time),
        );
    }
    out.truncate(out.trim_end().len());
    out
}

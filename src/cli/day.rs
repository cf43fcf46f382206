use std::{
    fmt::Write as _,
    io::{self, BufRead, Write},
};

use ansi_term::Colour;
use anyhow::Result;
use chrono::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    attendance::{
        entities::SessionStatus,
        error::AttendanceError,
        rules::{format_worked, ClockOutOutcome},
    },
    session::{shutdown::detect_shutdown, AttendanceSession, ClockOutReport},
    storage::key_value::KeyValueStore,
    utils::time::{
        display_heading, display_optional_time, display_time, display_time_with_seconds,
        format_elapsed,
    },
};

/// Storage failures don't abort a command. The change is already visible and will be written
/// again with the next successful save.
fn notify(persisted: Result<(), AttendanceError>, what: &str) {
    if let Err(e) = persisted {
        eprintln!("{}", Colour::Red.paint(format!("Failed to save {what}: {e}")));
    }
}

fn warn(message: String) {
    println!("{}", Colour::Yellow.bold().paint(message));
}

pub async fn clock_in<S: KeyValueStore>(session: &mut AttendanceSession<S>) -> Result<()> {
    let applied = session.clock_in().await?;
    notify(applied.persisted, "clock in time");
    if applied.outcome.is_late {
        warn(format!(
            "Clocked in late at {}, expected {}",
            display_time(applied.outcome.time),
            display_time(session.settings().expected_clock_in)
        ));
    }
    Ok(())
}

pub async fn clock_out<S: KeyValueStore>(
    session: &mut AttendanceSession<S>,
    skip_confirmation: bool,
) -> Result<()> {
    let expected = session.settings().expected_clock_out;
    let applied = session
        .clock_out(|outcome| {
            skip_confirmation || ask_confirmation(&clock_out_warning(outcome, expected))
        })
        .await?;
    notify(applied.persisted, "clock out time");

    match applied.outcome {
        ClockOutReport::Committed { time, is_early } if is_early => warn(format!(
            "Clocked out early at {}, expected {}",
            display_time(time),
            display_time(expected)
        )),
        ClockOutReport::Committed { .. } => {}
        ClockOutReport::Cancelled => println!("Clock out cancelled"),
    }
    Ok(())
}

fn clock_out_warning(outcome: &ClockOutOutcome, expected: chrono::NaiveTime) -> String {
    if outcome.precedes_clock_in {
        "Clock out time is before clock in time.".into()
    } else {
        format!("Expected clock out is {}.", display_time(expected))
    }
}

fn ask_confirmation(warning: &str) -> bool {
    print!("{warning} Clock out anyway? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_affirmative(&answer),
        Err(_) => false,
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub async fn start_break<S: KeyValueStore>(
    session: &mut AttendanceSession<S>,
    note: &str,
) -> Result<()> {
    let applied = session.start_break(note).await?;
    notify(applied.persisted, "break");
    Ok(())
}

pub async fn end_break<S: KeyValueStore>(session: &mut AttendanceSession<S>) -> Result<()> {
    let applied = session.end_break().await?;
    notify(applied.persisted, "break");
    Ok(())
}

pub async fn clear<S: KeyValueStore>(session: &mut AttendanceSession<S>) -> Result<()> {
    if let Err(e) = session.clear().await {
        if !e.is_storage_failure() {
            return Err(e.into());
        }
        eprintln!("{}", Colour::Red.paint(format!("Failed to clear records: {e}")));
    }
    Ok(())
}

/// Redraws the elapsed time in place until Ctrl-C. A day that isn't running prints once.
pub async fn watch<S: KeyValueStore>(session: &AttendanceSession<S>) -> Result<()> {
    let Some(receiver) = session.subscribe_elapsed() else {
        println!(
            "Elapsed {} ({})",
            format_elapsed(session.elapsed().unwrap_or_else(Duration::zero)),
            session.status()
        );
        return Ok(());
    };

    let cancellation = CancellationToken::new();
    let (_, result) = tokio::join!(
        detect_shutdown(cancellation.clone()),
        render_elapsed(receiver, cancellation),
    );
    println!();
    result
}

async fn render_elapsed(
    mut receiver: watch::Receiver<Duration>,
    cancellation: CancellationToken,
) -> Result<()> {
    let mut stdout = io::stdout();
    let result = loop {
        let elapsed = *receiver.borrow_and_update();
        let written = write!(stdout, "\rElapsed {}", format_elapsed(elapsed))
            .and_then(|_| stdout.flush());
        if let Err(e) = written {
            break Err(e.into());
        }

        tokio::select! {
            _ = cancellation.cancelled() => break Ok(()),
            changed = receiver.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
        }
    };
    // Lets shutdown detection finish as well.
    cancellation.cancel();
    result
}

/// Full description of a day, in the shape the time sheet shows it.
pub fn render_day<S: KeyValueStore>(session: &AttendanceSession<S>) -> String {
    let record = session.record();
    let mut out = String::new();

    let total = match session.total_worked() {
        Ok(total) => format_worked(total),
        Err(e) => format!("invalid ({e})"),
    };

    let _ = writeln!(out, "{}", display_heading(record.date));
    let _ = writeln!(out, "Status: {}", session.status());
    let _ = writeln!(out, "Clock In Time: {}", display_optional_time(record.clock_in_time));
    let _ = writeln!(out, "Clock Out Time: {}", display_optional_time(record.clock_out_time));
    let _ = writeln!(out, "Total Working Hours: {total}");
    // A past day that was never clocked out has no running time.
    if session.is_today()
        && matches!(session.status(), SessionStatus::ClockedIn | SessionStatus::OnBreak)
    {
        if let Some(elapsed) = session.elapsed() {
            let _ = writeln!(out, "Elapsed: {}", format_elapsed(elapsed));
        }
    }

    for (index, interval) in record.breaks.iter().enumerate() {
        let _ = writeln!(
            out,
            "Break {}\tStart: {}\tEnd: {}\tNote: {}",
            index + 1,
            display_time_with_seconds(interval.start),
            interval
                .end
                .map(display_time_with_seconds)
                .unwrap_or_else(|| "-".into()),
            interval.note
        );
    }
    out.truncate(out.trim_end().len());
    out
}

pub mod day;
pub mod week;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    session::AttendanceSession,
    storage::{key_value::FileKeyValueStore, record_storage::AttendanceStorage},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
        settings::Settings,
        time::{parse_record_date, parse_time_argument},
    },
};

const RECORDS_DIR: &str = "records";

#[derive(Parser, Debug)]
#[command(name = "Clockin", version, long_about = None)]
#[command(about = "Keeps a time sheet of clock-ins, clock-outs and breaks")]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(
        long = "expected-in",
        global = true,
        value_parser = parse_time_value,
        help = "Clock-ins after this time are late. Overrides settings.json. Example: 09:00"
    )]
    expected_in: Option<NaiveTime>,
    #[arg(
        long = "expected-out",
        global = true,
        value_parser = parse_time_value,
        help = "Clock-outs before this time are early. Overrides settings.json. Example: 17:00"
    )]
    expected_out: Option<NaiveTime>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Clock in for today")]
    In,
    #[command(about = "Clock out for today")]
    Out {
        #[arg(short, long, help = "Don't ask for confirmation when clocking out early")]
        yes: bool,
    },
    #[command(about = "Start or end a break")]
    Break {
        #[command(subcommand)]
        command: BreakCommand,
    },
    #[command(about = "Show the record of a day")]
    Status {
        #[arg(
            long,
            value_parser = parse_date_value,
            help = "Day to show, YYYY-MM-DD. Today by default"
        )]
        date: Option<NaiveDate>,
    },
    #[command(about = "Show time worked today, updated every second. Stop with Ctrl-C")]
    Watch,
    #[command(about = "Clear today's record")]
    Clear,
    #[command(about = "Show the current work week")]
    Week,
}

#[derive(Subcommand, Debug)]
enum BreakCommand {
    #[command(about = "Start a break")]
    Start {
        #[arg(short, long, default_value = "", help = "Note attached to the break")]
        note: String,
    },
    #[command(about = "End the current break")]
    End,
}

fn parse_time_value(value: &str) -> Result<NaiveTime, String> {
    parse_time_argument(value).map_err(|e| format!("Expected HH:MM or HH:MM:SS: {e}"))
}

fn parse_date_value(value: &str) -> Result<NaiveDate, String> {
    parse_record_date(value).map_err(|e| format!("Expected YYYY-MM-DD: {e}"))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, ensure_dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let settings = Settings::load(&app_dir)
        .await?
        .with_overrides(args.expected_in, args.expected_out);
    let storage = AttendanceStorage::new(FileKeyValueStore::new(app_dir.join(RECORDS_DIR))?);
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let today = clock.now().date();
    info!("Running {:?} on {today}", args.commands);

    // Only the current day can be changed, other days are read only.
    let date = match &args.commands {
        Commands::Status { date: Some(date) } => *date,
        _ => today,
    };

    if let Commands::Week = args.commands {
        return week::print_week(&storage, today).await;
    }

    let mut session = AttendanceSession::open(storage, clock, settings, date).await?;
    let result = match args.commands {
        Commands::In => day::clock_in(&mut session).await,
        Commands::Out { yes } => day::clock_out(&mut session, yes).await,
        Commands::Break {
            command: BreakCommand::Start { note },
        } => day::start_break(&mut session, &note).await,
        Commands::Break {
            command: BreakCommand::End,
        } => day::end_break(&mut session).await,
        Commands::Clear => day::clear(&mut session).await,
        Commands::Watch => day::watch(&session).await,
        Commands::Status { .. } | Commands::Week => Ok(()),
    };

    if result.is_ok() {
        println!("{}", day::render_day(&session));
    }
    session.close().await;
    result
}

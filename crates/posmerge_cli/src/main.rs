//! `posmerge` command line entry point.
//!
//! # Responsibility
//! - Parse the run configuration (database, dry-run flag, logging).
//! - Wire the SQLite store, merge service and console reporter together.
//! - Map run outcomes onto the exit code contract in `exit_codes`.

mod console;
mod exit_codes;

use clap::Parser;
use console::ConsoleReporter;
use exit_codes::{merge_exit_code, EXIT_DB_OPEN, EXIT_ERROR, EXIT_LOGGING, EXIT_SUCCESS};
use log::info;
use posmerge_core::db::open_db;
use posmerge_core::{
    default_log_level, init_logging, parse_log_level, LogReporter, MergeService, RunMode,
    RunOutcome, RunState, RunSummary, SqlitePositionStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "posmerge")]
#[command(about = "Merge duplicate positions, keeping the one with the lowest position value")]
#[command(version)]
struct Cli {
    /// SQLite database holding the positions table.
    #[arg(long, env = "POSMERGE_DB")]
    db: PathBuf,

    /// Show what would be done without making changes.
    #[arg(long)]
    dry_run: bool,

    /// Log level: trace, debug, info, warn or error.
    #[arg(
        long,
        env = "POSMERGE_LOG_LEVEL",
        default_value_t = default_log_level().to_string(),
        value_parser = log_level_arg
    )]
    log_level: String,

    /// Absolute directory for rolling log files. File logging is off when unset.
    #[arg(long, env = "POSMERGE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Print the outcome as JSON instead of progress text.
    #[arg(long)]
    json: bool,

    /// Only print violations and failures.
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
}

impl CliError {
    fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    mode: RunMode,
    state: RunState,
    summary: &'a RunSummary,
    error: Option<JsonError>,
}

#[derive(Serialize)]
struct JsonError {
    code: &'static str,
    message: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(CliError { code, message }) => {
            eprintln!("error: {message}");
            ExitCode::from(code)
        }
    }
}

fn log_level_arg(value: &str) -> Result<String, String> {
    parse_log_level(value)
        .map(str::to_string)
        .map_err(|err| err.to_string())
}

fn run(cli: Cli) -> Result<u8, CliError> {
    if let Some(log_dir) = &cli.log_dir {
        let log_dir = log_dir.to_str().ok_or_else(|| {
            CliError::new(
                EXIT_LOGGING,
                format!("log_dir `{}` is not valid UTF-8", log_dir.display()),
            )
        })?;
        init_logging(&cli.log_level, log_dir)
            .map_err(|err| CliError::new(EXIT_LOGGING, err.to_string()))?;
    }

    if !cli.db.exists() {
        return Err(CliError::new(
            EXIT_DB_OPEN,
            format!("database `{}` does not exist", cli.db.display()),
        ));
    }
    let conn = open_db(&cli.db).map_err(|err| {
        CliError::new(
            EXIT_DB_OPEN,
            format!("failed to open `{}`: {err}", cli.db.display()),
        )
    })?;
    let store = SqlitePositionStore::try_new(&conn)
        .map_err(|err| CliError::new(EXIT_DB_OPEN, err.to_string()))?;
    let service = MergeService::new(store);

    let mode = RunMode::from_dry_run(cli.dry_run);
    info!(
        "event=cli_run module=cli status=start mode={} db={}",
        mode.as_str(),
        cli.db.display()
    );

    let outcome = if cli.json {
        let outcome = service.run(mode, &mut LogReporter);
        print_json(&outcome)?;
        outcome
    } else {
        if mode == RunMode::DryRun && !cli.quiet {
            println!("DRY RUN MODE - No changes will be made");
        }
        let mut reporter = ConsoleReporter::new(std::io::stdout(), std::io::stderr(), cli.quiet);
        service.run(mode, &mut reporter)
    };

    Ok(match &outcome.error {
        None => EXIT_SUCCESS,
        Some(err) => merge_exit_code(err),
    })
}

fn print_json(outcome: &RunOutcome) -> Result<(), CliError> {
    let view = JsonOutcome {
        mode: outcome.mode,
        state: outcome.state,
        summary: &outcome.summary,
        error: outcome.error.as_ref().map(|err| JsonError {
            code: err.code(),
            message: err.to_string(),
        }),
    };
    let text = serde_json::to_string_pretty(&view)
        .map_err(|err| CliError::new(EXIT_ERROR, err.to_string()))?;
    println!("{text}");
    Ok(())
}

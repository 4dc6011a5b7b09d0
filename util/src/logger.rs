//! Generic logger utility functions
//!
//! Records go to stdout with coloured level tags and to the session log file as plain text. Both
//! lines are prefixed with the seconds elapsed since the session epoch.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{self, info, Level};
use fern::{Dispatch, FormatCallback};
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Log target of the optimizer backend, which is extremely verbose at trace level.
const SOLVER_LOG_TARGET: &str = "mpc_lib::grad_solver";

/// Crate prefixes stripped from targets, these are the same on every line.
const TARGET_PREFIXES: [&str; 2] = ["mpc_lib::", "mpc_exec::"];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level less than `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Notes
///
/// - `min_level` must be greater than `log::Level::Info`.
/// - The optimizer backend is capped at `Debug` regardless of `min_level`.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    min_level: self::LevelFilter,
    session: &session::Session
) -> Result<(), LoggerInitError> {

    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let stdout = Dispatch::new()
        .format(|out, message, record| {
            format_line(out, message, record, level_tag(record.level()))
        })
        .chain(std::io::stdout());

    // No escape codes in the file
    let file = Dispatch::new()
        .format(|out, message, record| {
            format_line(out, message, record, record.level().as_str()[..3].normal())
        })
        .chain(log_file);

    Dispatch::new()
        .level(min_level)
        .level_for(SOLVER_LOG_TARGET, min_level.min(LevelFilter::Debug))
        .chain(stdout)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Write `[elapsed LVL] message`, with the short target before the message for debug and trace.
fn format_line(
    out: FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
    tag: ColoredString
) {
    let elapsed_s = session::get_elapsed_seconds();

    if record.level() > Level::Info {
        out.finish(format_args!(
            "[{:>10.3}s {}] {}: {}",
            elapsed_s,
            tag,
            short_target(record.target()),
            message
        ))
    }
    else {
        out.finish(format_args!("[{:>10.3}s {}] {}", elapsed_s, tag, message))
    }
}

/// Target with the crate prefix removed, `mpc_lib::mpc_ctrl::state` becomes `mpc_ctrl::state`.
fn short_target(target: &str) -> &str {
    TARGET_PREFIXES
        .iter()
        .find_map(|p| target.strip_prefix(p))
        .unwrap_or(target)
}

/// Coloured tag for a log level
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRA".dimmed().italic(),
        Level::Debug => "DEB".dimmed(),
        Level::Info  => "INF".normal(),
        Level::Warn  => "WAR".yellow(),
        Level::Error => "ERR".red().bold()
    }
}

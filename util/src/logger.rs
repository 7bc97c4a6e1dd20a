//! Logger for the car executables
//!
//! Every line carries the session time and the name of the thread which logged it, as the lane
//! following, sign detection and user command tasks all log concurrently.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fmt;
use std::thread;

use log::{self, info};
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Width of the thread name column.
const THREAD_COLUMN_WIDTH: usize = 11;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
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
/// Lines go both to stdout and to the session's log file.
///
/// # Notes
///
/// - `min_level` must be at least `log::Level::Info`, the car must never run with warnings
///   silenced.
/// - Image decoding is capped at `Info`, otherwise replaying frames at debug level buries the
///   car's own messages.
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

    fern::Dispatch::new()
        .format(|out, message, record| {
            let thread = thread::current();
            out.finish(format_args!(
                "{} {}",
                LinePrefix {
                    elapsed_s: session::get_elapsed_seconds(),
                    level: record.level(),
                    thread: thread.name(),
                    target: record.target()
                },
                message
            ))
        })
        .level(min_level)
        .level_for("png", LevelFilter::Info)
        .level_for("image", LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE
// ---------------------------------------------------------------------------

/// Everything on a log line before the message.
struct LinePrefix<'a> {
    elapsed_s: f64,
    level: log::Level,
    thread: Option<&'a str>,
    target: &'a str,
}

impl<'a> fmt::Display for LinePrefix<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:10.6} {} {:<width$}]",
            self.elapsed_s,
            level_to_str(self.level),
            self.thread.unwrap_or("?"),
            width = THREAD_COLUMN_WIDTH
        )?;

        // Debug and trace lines say which module they came from
        if self.level > log::Level::Info {
            write!(f, " {}:", self.target)?;
        }

        Ok(())
    }
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}

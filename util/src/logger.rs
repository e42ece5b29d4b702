//! Logger setup
//!
//! Log lines go to stdout with coloured level tags and to the session log file as plain text. Each
//! line is stamped with the seconds elapsed since the session epoch, debug and trace lines also
//! carry the module path they came from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fmt::Arguments;
use log::{self, info, Level};
use colored::Colorize;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The log level must include INFO messages, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Error opening the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("A logger has already been set: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` must let INFO messages through, the tuning results are logged at that level.
///
/// Only the first call can succeed, later calls return `FernInitError`.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let console = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!(
            "{}",
            format_line(
                session::elapsed_seconds(),
                record.level(),
                record.target(),
                message,
                true
            )
        )))
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!(
            "{}",
            format_line(
                session::elapsed_seconds(),
                record.level(),
                record.target(),
                message,
                false
            )
        )))
        .chain(log_file);

    fern::Dispatch::new()
        .level(min_level)
        .level_for("zmq", LevelFilter::Info)
        .chain(console)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build one log line.
fn format_line(
    elapsed_s: f64,
    level: Level,
    target: &str,
    message: &Arguments,
    coloured: bool
) -> String {
    let tag = level_tag(level, coloured);

    if level > Level::Info {
        format!("[{:10.6} {}] {}: {}", elapsed_s, tag, target, message)
    }
    else {
        format!("[{:10.6} {}] {}", elapsed_s, tag, message)
    }
}

/// Three letter tag for a log level.
fn level_tag(level: Level, coloured: bool) -> String {
    let tag = match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    };

    if !coloured {
        return tag.to_string();
    }

    let coloured_tag = match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info  => tag.normal(),
        Level::Warn  => tag.yellow(),
        Level::Error => tag.red().bold()
    };

    coloured_tag.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plain_lines() {
        assert_eq!(
            format_line(1.5, Level::Info, "ctrl_lib::twiddle", &format_args!("rms {}", 2), false),
            "[  1.500000 INF] rms 2"
        );

        // Target included below INFO
        assert_eq!(
            format_line(0.25, Level::Debug, "ctrl_lib::twiddle", &format_args!("steps"), false),
            "[  0.250000 DBG] ctrl_lib::twiddle: steps"
        );
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(level_tag(Level::Warn, false), "WRN");
        assert_eq!(level_tag(Level::Trace, false), "TRC");

        // Colour codes may be stripped depending on the terminal, the tag text is always there
        assert!(level_tag(Level::Error, true).contains("ERR"));
    }
}

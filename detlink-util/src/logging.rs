//! Process-wide structured logger (SPEC_FULL.md §4.G).
//!
//! Constructed once at startup from the resolved [`crate::config::LogLevel`]
//! and optional log file, then threaded through every module as a cloned
//! `slog::Logger` handle. `slog`/`sloggers` serialize writes at the sink
//! level, so no caller needs its own lock.

use std::path::{Path, PathBuf};

use slog::Logger;
use sloggers::file::FileLoggerBuilder;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

use crate::config::LogLevel;

/// A log-sink initialization failure, reported the same way as any other
/// fatal init failure (SPEC_FULL.md §4.F: exit 1, no socket or log file left
/// half-open).
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    FileOpen { path: PathBuf, source: sloggers::Error },
    #[error("failed to initialize terminal logger: {0}")]
    Terminal(sloggers::Error),
}

/// Builds the root logger. `level == LogLevel::Off` yields a discarding
/// logger rather than a conditional at every call site.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<Logger, LoggingError> {
    let severity = match level.to_severity() {
        Some(sev) => sev,
        None => return Ok(Logger::root(slog::Discard, slog::o!())),
    };

    match log_file {
        Some(path) => {
            let mut builder = FileLoggerBuilder::new(path);
            builder.level(severity);
            builder.build().map_err(|source| LoggingError::FileOpen {
                path: path.to_path_buf(),
                source,
            })
        }
        None => {
            let mut builder = TerminalLoggerBuilder::new();
            builder.level(severity);
            builder.destination(Destination::Stderr);
            builder.build().map_err(LoggingError::Terminal)
        }
    }
}

impl LogLevel {
    pub(crate) fn to_severity(self) -> Option<Severity> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Severity::Error),
            LogLevel::Warn => Some(Severity::Warning),
            LogLevel::Info => Some(Severity::Info),
            LogLevel::Debug => Some(Severity::Debug),
            LogLevel::Trace => Some(Severity::Trace),
        }
    }
}

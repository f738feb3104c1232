//! Stderr logging for the platch CLI.
//!
//! Results and events are printed on stdout, so every diagnostic line
//! goes to stderr to keep stdout machine-readable. The level defaults
//! to `info`; raise it per run with `--log-level` or the `PLATCH_LOG`
//! environment variable.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Rendering of log lines on stderr.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One human-oriented text line per record.
    Text,
    /// One JSON object per record.
    Json,
}

/// Minimum severity that reaches stderr.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. A second call (tests, embedding)
/// leaves the first subscriber in place.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::from(level))
        .with_ansi(false)
        .with_target(false);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialized, keeping the existing subscriber");
    }
}

//! Tracing setup shared by atrium binaries
//!
//! The filter comes from `ATRIUM_LOG` (same syntax as `RUST_LOG`); output
//! goes to stderr for foreground runs or to a file under the state dir for
//! the daemon.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, AtriumError, Result};

/// Environment variable controlling the log filter
const LOG_ENV_VAR: &str = "ATRIUM_LOG";

/// Where log lines end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// Append to `atrium.log` under the state directory's log dir
    File,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output: LogOutput,
    /// Filter directive string, e.g. "info" or "atrium=debug,tokio=warn"
    pub filter: String,
    /// Emit span enter/exit events
    pub span_events: bool,
    /// Annotate lines with file and line number
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: filter_from_env("info"),
            span_events: false,
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Verbose file-backed config for the daemon
    pub fn server() -> Self {
        Self {
            output: LogOutput::File,
            span_events: true,
            file_line: true,
            ..Self::default()
        }
    }
}

fn filter_from_env(fallback: &str) -> String {
    std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| fallback.to_string())
}

/// Initialize stderr logging with the `ATRIUM_LOG` filter
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging from an explicit config
///
/// Fails if the filter string does not parse or the log file cannot be
/// opened; calling it a second time in one process also fails.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| AtriumError::config(format!("Invalid log filter: {}", e)))?;

    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let registry = tracing_subscriber::registry().with(filter);
    match config.output {
        LogOutput::Stderr => registry
            .with(layer.with_writer(std::io::stderr))
            .try_init(),
        LogOutput::File => {
            let file = open_log_file()?;
            registry
                .with(layer.with_writer(file).with_ansi(false))
                .try_init()
        }
    }
    .map_err(|e| AtriumError::internal(format!("Failed to init logging: {}", e)))
}

fn open_log_file() -> Result<std::fs::File> {
    let dir = paths::log_dir();
    std::fs::create_dir_all(&dir).map_err(|source| AtriumError::FileWrite {
        path: dir.clone(),
        source,
    })?;

    let path = dir.join("atrium.log");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| AtriumError::FileWrite { path, source })
}

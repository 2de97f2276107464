use std::env;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{Span, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::config_directory;

const DEFAULT_FILTER: &str = "info";

/// Where the JSON-lines record of a run is kept. Stdout is never used for logs
/// because it may carry the CSV table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunLog {
    /// Stderr only.
    #[default]
    Off,
    /// `logs/run-<started>.jsonl` under the config directory, one file per run.
    PerRun,
    /// Append to this file.
    At(PathBuf),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid logging filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install logging subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the file writer alive; buffered lines are flushed when it is dropped.
#[must_use = "dropping the handle stops the log file writer"]
#[derive(Debug)]
pub struct LogHandle {
    run_id: String,
    path: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl LogHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Root span for one run; every event inside it carries the run id and command.
    pub fn run_span(&self, command: &str) -> Span {
        info_span!("run", run_id = %self.run_id, command)
    }
}

/// Install the global subscriber: plain stderr lines plus the optional JSON run log.
pub fn init_logging(run_log: &RunLog) -> Result<LogHandle, LoggingError> {
    let started = Local::now();
    let run_id = started.format("%Y%m%dT%H%M%S").to_string();
    let filter = EnvFilter::try_new(filter_directive(
        env::var("CINEMERGE_LOG").ok(),
        env::var("RUST_LOG").ok(),
    ))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .boxed();

    let path = run_log_path(run_log, &started);
    let (file_layer, guard) = match path.as_deref() {
        Some(path) => {
            let (dir, file_name) = split_log_path(path)?;
            fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(path) = path.as_ref() {
        info!(path = %path.display(), run_id = %run_id, "writing run log");
    }

    Ok(LogHandle {
        run_id,
        path,
        _guard: guard,
    })
}

/// `CINEMERGE_LOG` wins over `RUST_LOG`; blank values count as unset.
fn filter_directive(cinemerge_log: Option<String>, rust_log: Option<String>) -> String {
    [cinemerge_log, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn run_log_path(run_log: &RunLog, started: &DateTime<Local>) -> Option<PathBuf> {
    match run_log {
        RunLog::Off => None,
        RunLog::PerRun => Some(
            config_directory()
                .join("logs")
                .join(format!("run-{}.jsonl", started.format("%Y%m%dT%H%M%S"))),
        ),
        RunLog::At(path) => Some(path.clone()),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, &std::ffi::OsStr), io::Error> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not name a file", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

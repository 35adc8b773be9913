//! Structured telemetry initialisation for the daemon.
//!
//! The subscriber's filter sits behind a reload layer so clients can switch
//! the daemon between debug output and its configured filter at runtime.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mq_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Subscriber, info, warn};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, reload};

use crate::dispatch::VerbosityControl;

pub(crate) const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

/// Filter installed by the `debug` verb.
pub const VERBOSE_FILTER: &str = "debug";

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

type Reloader = Arc<dyn Fn(&str) -> Result<(), TelemetryError> + Send + Sync>;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// The log file could not be opened.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Swapping the active filter failed.
    #[error("failed to reload log filter: {0}")]
    Reload(String),
    /// Another subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Where events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// The process's standard error.
    Stderr,
    /// An append-only file, used once the daemon has detached.
    File(PathBuf),
}

/// Handle on the installed subscriber.
#[derive(Clone)]
pub struct TelemetryHandle {
    configured: Arc<str>,
    reload: Reloader,
}

impl std::fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

impl TelemetryHandle {
    /// Filter expression the daemon was started with.
    #[must_use]
    pub fn configured_filter(&self) -> &str {
        &self.configured
    }

    /// Replaces the active filter.
    pub fn apply(&self, directive: &str) -> Result<(), TelemetryError> {
        (self.reload)(directive)
    }
}

impl VerbosityControl for TelemetryHandle {
    fn set_verbose(&self, enabled: bool) {
        let directive = if enabled {
            VERBOSE_FILTER
        } else {
            self.configured_filter()
        };
        match self.apply(directive) {
            Ok(()) => info!(target: TELEMETRY_TARGET, filter = directive, "log filter changed"),
            Err(error) => warn!(target: TELEMETRY_TARGET, error = %error, "log filter unchanged"),
        }
    }
}

/// Installs the global subscriber on first use.
///
/// Later calls return the handle from the first call; their arguments are
/// ignored.
pub fn initialise(config: &Config, sink: &LogSink) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install_subscriber(config, sink))
        .cloned()
}

fn install_subscriber(config: &Config, sink: &LogSink) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let (writer, ansi) = match sink {
        LogSink::Stderr => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
        LogSink::File(path) => (BoxMakeWriter::new(Mutex::new(open_log(path)?)), false),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339());

    let (subscriber, reload): (Box<dyn Subscriber + Send + Sync>, Reloader) =
        match config.log_format() {
            LogFormat::Json => {
                let json = builder.json().flatten_event(true).with_filter_reloading();
                let reload = reloader(json.reload_handle());
                (Box::new(json.finish()), reload)
            }
            LogFormat::Compact => {
                let compact = builder.compact().with_filter_reloading();
                let reload = reloader(compact.reload_handle());
                (Box::new(compact.finish()), reload)
            }
        };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(TelemetryHandle {
        configured: Arc::from(config.log_filter()),
        reload,
    })
}

fn reloader<S: 'static>(handle: reload::Handle<EnvFilter, S>) -> Reloader {
    Arc::new(move |directive: &str| {
        let filter = parse_filter(directive)?;
        handle
            .reload(filter)
            .map_err(|error| TelemetryError::Reload(error.to_string()))
    })
}

fn parse_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn open_log(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

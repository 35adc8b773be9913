//! Starts `mqd` on demand when no daemon answers on the configured socket.
//!
//! The client spawns the daemon binary with the same configuration flags it
//! was given, then polls until the socket accepts connections. The daemon's
//! health snapshot is consulted only to fail fast when start-up is aborted.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mq_config::{Config, RuntimePaths, RuntimePathsError};
use serde::Deserialize;
use thiserror::Error;

use crate::transport;

/// Environment variable naming the daemon binary to spawn.
pub const DAEMON_BIN_ENV_VAR: &str = "MQ_DAEMON_BIN";

const DEFAULT_DAEMON_BIN: &str = "mqd";
pub(crate) const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors raised while auto-starting the daemon.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Runtime artefact paths could not be derived from the socket.
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    /// The daemon binary could not be started.
    #[error("failed to spawn daemon binary '{binary:?}': {source}")]
    LaunchDaemon {
        /// Binary that was executed.
        binary: OsString,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Polling the spawned process failed.
    #[error("failed to monitor daemon launch: {source}")]
    MonitorChild {
        /// Underlying wait error.
        #[source]
        source: io::Error,
    },
    /// The launcher exited unsuccessfully before the socket came up.
    #[error("daemon exited before accepting connections (status: {exit_status:?}); see {log:?}")]
    StartupFailed {
        /// Exit code, when the launcher was not killed by a signal.
        exit_status: Option<i32>,
        /// Daemon log worth inspecting.
        log: PathBuf,
    },
    /// A fresh health snapshot said the daemon is stopping.
    #[error("daemon reported 'stopping' before accepting connections; check {path:?}")]
    StartupAborted {
        /// Health snapshot that reported the abort.
        path: PathBuf,
    },
    /// The socket never accepted a connection in time.
    #[error("timed out after {timeout:?} waiting for the daemon on {endpoint}")]
    StartupTimeout {
        /// Endpoint that was polled.
        endpoint: String,
        /// How long the client waited.
        timeout: Duration,
    },
    /// The health snapshot exists but could not be read.
    #[error("failed to read health snapshot {path:?}: {source}")]
    ReadHealth {
        /// Health snapshot path.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: io::Error,
    },
    /// The health snapshot is not valid JSON for its schema.
    #[error("failed to parse health snapshot {path:?}: {source}")]
    ParseHealth {
        /// Health snapshot path.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the start-up notice failed.
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DaemonStatus {
    Starting,
    Ready,
    Stopping,
}

#[derive(Debug, Deserialize)]
struct HealthSnapshot {
    status: DaemonStatus,
    timestamp: u64,
}

/// Everything needed to bring a daemon up for `config`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AutoStart<'a> {
    pub(crate) config: &'a Config,
    /// Configuration flags forwarded verbatim to the daemon.
    pub(crate) forwarded: &'a [OsString],
    pub(crate) binary: &'a OsStr,
    pub(crate) timeout: Duration,
}

impl AutoStart<'_> {
    /// Spawns the daemon and blocks until its socket accepts connections.
    pub(crate) fn run<E: Write>(&self, stderr: &mut E) -> Result<(), LifecycleError> {
        writeln!(
            stderr,
            "mq: no daemon on {}; starting {}",
            self.config.daemon_socket(),
            self.binary.to_string_lossy()
        )
        .map_err(LifecycleError::Io)?;
        let paths = RuntimePaths::from_config(self.config)?;
        let started_at = unix_seconds();
        let mut child = spawn_daemon(self.binary, self.forwarded)?;
        self.wait_for_socket(&paths, &mut child, started_at)
    }

    fn wait_for_socket(
        &self,
        paths: &RuntimePaths,
        child: &mut Child,
        started_at: u64,
    ) -> Result<(), LifecycleError> {
        let endpoint = self.config.daemon_socket();
        let deadline = Instant::now() + self.timeout;
        loop {
            if transport::is_reachable(endpoint, PROBE_TIMEOUT) {
                return Ok(());
            }
            // A zero exit is the launcher detaching; the daemon lives on.
            if let Some(status) = child
                .try_wait()
                .map_err(|source| LifecycleError::MonitorChild { source })?
                .filter(|status| !status.success())
            {
                return Err(LifecycleError::StartupFailed {
                    exit_status: status.code(),
                    log: paths.log_path().to_path_buf(),
                });
            }
            if let Some(snapshot) = read_health(paths.health_path())?
                && snapshot.status == DaemonStatus::Stopping
                && snapshot.timestamp >= started_at
            {
                return Err(LifecycleError::StartupAborted {
                    path: paths.health_path().to_path_buf(),
                });
            }
            if Instant::now() >= deadline {
                return Err(LifecycleError::StartupTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Picks the daemon binary: explicit override, then [`DAEMON_BIN_ENV_VAR`],
/// then `mqd` from `PATH`.
pub(crate) fn resolve_daemon_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(DAEMON_BIN_ENV_VAR))
        .unwrap_or_else(|| OsString::from(DEFAULT_DAEMON_BIN))
}

fn spawn_daemon(binary: &OsStr, forwarded: &[OsString]) -> Result<Child, LifecycleError> {
    // The detached daemon would otherwise hold the caller's pipes open.
    Command::new(binary)
        .args(forwarded)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon {
            binary: binary.to_os_string(),
            source,
        })
}

fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|source| {
            LifecycleError::ParseHealth {
                path: path.to_path_buf(),
                source,
            }
        }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadHealth {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

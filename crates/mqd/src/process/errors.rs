//! Errors that stop the daemon before, during, or after the event loop.

use std::io;
use std::path::PathBuf;
use std::time::SystemTimeError;

use mq_config::{RuntimePathsError, SocketPreparationError};
use nix::errno::Errno;
use thiserror::Error;

use crate::server::ServerError;
use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;

/// Fatal launch and runtime failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Preparing the socket directory failed.
    #[error("failed to prepare daemon socket: {0}")]
    Socket(#[from] SocketPreparationError),
    /// Deriving or creating runtime paths failed.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A live daemon already holds the lock.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// Pid recorded by the running daemon.
        pid: u32,
    },
    /// Removing a stale runtime artefact failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Artefact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing the recorded pid failed for a reason other than absence.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// Recorded pid.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Writing the pid file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the health snapshot failed.
    #[error("failed to write health snapshot '{path}': {source}")]
    HealthWrite {
        /// Health file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising the health snapshot failed.
    #[error("failed to serialise health snapshot: {0}")]
    HealthSerialise(#[from] serde_json::Error),
    /// The system clock is before the epoch.
    #[error("failed to read system time: {0}")]
    Clock(#[from] SystemTimeError),
    /// A health update was attempted before the pid was recorded.
    #[error("pid must be written before updating health state")]
    MissingPid,
    /// Detaching failed.
    #[error("failed to daemonise: {0}")]
    Daemonize(#[from] DaemonizeError),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The listening socket could not be bound.
    #[error("daemon socket listener failed: {0}")]
    Listener(#[from] ListenerError),
    /// The event loop stopped on a fatal error.
    #[error("event loop failed: {0}")]
    Server(#[from] ServerError),
}

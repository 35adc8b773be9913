//! Error types and diagnostics helpers for the client runtime.

use std::io;

use mq_config::ConfigError;
use mq_protocol::{FrameError, RequestError};
use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[from] ConfigError),
    #[error("failed to encode request: {0}")]
    EncodeRequest(#[from] RequestError),
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },
    #[error("no daemon is listening on {endpoint}")]
    NotRunning { endpoint: String },
    #[error("failed to send request to daemon: {0}")]
    SendRequest(io::Error),
    #[error("failed to read response from daemon: {0}")]
    ReadResponse(#[from] FrameError),
    #[error("failed to forward daemon output: {0}")]
    ForwardResponse(io::Error),
    #[error("daemon closed the connection without a status")]
    MissingStatus,
    #[error("failed to start the daemon: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Whether `error` means nothing is serving the socket yet.
///
/// A missing socket file and a refused connection both qualify; anything
/// else points at a daemon that exists but misbehaves.
pub(crate) fn is_daemon_not_running(error: &AppError) -> bool {
    match error {
        AppError::Connect { source, .. } => matches!(
            source.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::NotFound
                | io::ErrorKind::AddrNotAvailable
        ),
        _ => false,
    }
}

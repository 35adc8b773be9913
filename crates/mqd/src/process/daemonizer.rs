//! Detaching from the controlling terminal.

use std::ffi::OsStr;

use daemonize_me::Daemon;
use mq_config::RuntimePaths;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Strategy for moving the daemon into the background.
pub trait Daemonizer {
    /// Detaches the process. Returns only inside the detached process.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// The double fork or session setup failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser backed by `daemonize-me`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Creates the daemoniser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        let daemon = Daemon::new()
            .work_dir(paths.runtime_dir())
            .name(OsStr::new(env!("CARGO_PKG_NAME")));
        daemon.start()?;
        info!(
            target: PROCESS_TARGET,
            runtime = %paths.runtime_dir().display(),
            "detached into background"
        );
        Ok(())
    }
}

//! Launch sequencing: guard, detach, log, bind, serve, tear down.

use std::env;

use mq_config::{Config, RuntimePaths};
use tracing::{error, info};

use crate::dispatch::CommandDispatcher;
use crate::job::SystemDriver;
use crate::server::{Server, StopReason};
use crate::supervisor::Supervisor;
use crate::telemetry::{self, LogSink};
use crate::transport::SocketListener;

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::{FOREGROUND_ENV_VAR, PROCESS_TARGET};

/// Whether the daemon detaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and log to the runtime log file.
    Background,
    /// Stay attached to the terminal and log to stderr.
    Foreground,
}

impl LaunchMode {
    /// Foreground when requested by flag or by [`FOREGROUND_ENV_VAR`].
    #[must_use]
    pub fn detect(foreground_flag: bool) -> Self {
        if foreground_flag || env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }

    fn log_sink(self, paths: &RuntimePaths) -> LogSink {
        match self {
            Self::Background => LogSink::File(paths.log_path().to_path_buf()),
            Self::Foreground => LogSink::Stderr,
        }
    }
}

/// Collaborators needed to launch the daemon.
#[derive(Debug)]
pub struct LaunchPlan<Z> {
    /// Detach or stay attached.
    pub mode: LaunchMode,
    /// Backend used when detaching.
    pub daemonizer: Z,
}

/// Runs the daemon with the production collaborators.
pub fn run_daemon(config: &Config, mode: LaunchMode) -> Result<StopReason, LaunchError> {
    run_daemon_with(
        config,
        LaunchPlan {
            mode,
            daemonizer: SystemDaemonizer::new(),
        },
    )
}

/// Runs the daemon until a client sends `exit` or a termination signal
/// arrives.
pub fn run_daemon_with<Z: Daemonizer>(
    config: &Config,
    plan: LaunchPlan<Z>,
) -> Result<StopReason, LaunchError> {
    let LaunchPlan { mode, daemonizer } = plan;

    config.daemon_socket().prepare_filesystem()?;
    let paths = RuntimePaths::from_config(config)?;
    let mut guard = ProcessGuard::acquire(paths)?;
    if mode == LaunchMode::Background {
        daemonizer.daemonize(guard.paths())?;
    }
    let verbosity = telemetry::initialise(config, &mode.log_sink(guard.paths()))?;
    info!(
        target: PROCESS_TARGET,
        mode = ?mode,
        socket = %config.daemon_socket(),
        cpu_budget = config.cpu_budget().get(),
        "starting daemon"
    );

    guard.write_pid(std::process::id())?;
    guard.write_health(HealthState::Starting)?;
    let listener = SocketListener::bind(config.daemon_socket())?;
    let supervisor = Supervisor::new(SystemDriver::new(), config.cpu_budget());
    let mut server = Server::new(listener, supervisor, CommandDispatcher::new(verbosity))?;
    guard.write_health(HealthState::Ready)?;

    let outcome = server.run();
    if let Err(failure) = &outcome {
        error!(target: PROCESS_TARGET, error = %failure, "daemon stopping on fatal error");
    }
    guard.write_health(HealthState::Stopping)?;
    drop(server);
    let reason = outcome?;
    info!(target: PROCESS_TARGET, reason = ?reason, "shutdown complete");
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::daemonizer::DaemonizeError;
    use mockall::mock;
    use rstest::rstest;

    mock! {
        Detacher {}
        impl Daemonizer for Detacher {
            fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
        }
    }

    #[rstest]
    fn flag_forces_foreground() {
        assert_eq!(LaunchMode::detect(true), LaunchMode::Foreground);
    }

    #[rstest]
    fn background_logs_to_runtime_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("mqd.sock");
        let config = Config::builder()
            .daemon_socket(mq_config::SocketEndpoint::unix(
                socket.to_str().expect("utf8 path"),
            ))
            .build();
        let paths = RuntimePaths::from_config(&config).expect("paths");
        assert_eq!(
            LaunchMode::Background.log_sink(&paths),
            LogSink::File(dir.path().join("mqd.log"))
        );
        assert_eq!(LaunchMode::Foreground.log_sink(&paths), LogSink::Stderr);
    }

    #[rstest]
    fn live_daemon_blocks_second_launch_before_detaching() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("mqd.sock");
        let config = Config::builder()
            .daemon_socket(mq_config::SocketEndpoint::unix(
                socket.to_str().expect("utf8 path"),
            ))
            .build();
        let paths = RuntimePaths::from_config(&config).expect("paths");
        std::fs::write(paths.lock_path(), b"").expect("lock");
        std::fs::write(paths.pid_path(), format!("{}\n", std::process::id())).expect("pid");

        let mut daemonizer = MockDetacher::new();
        daemonizer.expect_daemonize().times(0);
        let error = run_daemon_with(
            &config,
            LaunchPlan {
                mode: LaunchMode::Background,
                daemonizer,
            },
        )
        .expect_err("second launch should fail");
        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
    }
}

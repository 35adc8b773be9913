//! Command-line surface of the `mqd` binary.

use std::ffi::OsString;

use clap::Parser;
use mq_config::{Config, ConfigArgs, ConfigError};
use thiserror::Error;

use crate::process::{LaunchError, LaunchMode, run_daemon};
use crate::server::StopReason;

/// `mqd [config flags] [--foreground]`
#[derive(Debug, Parser)]
#[command(name = "mqd", version, about = "Single-node job queue daemon")]
pub struct DaemonCli {
    /// Shared configuration flags.
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Stay attached to the terminal and log to stderr.
    #[arg(long)]
    pub foreground: bool,
}

/// Errors that end the `mqd` binary.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The command line did not parse, or help was requested.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// Configuration could not be resolved.
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    /// The daemon failed to start or stopped on a fatal error.
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Parses `args` (program name first), resolves configuration and runs the
/// daemon to completion.
pub fn run<I, T>(args: I) -> Result<StopReason, DaemonError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = DaemonCli::try_parse_from(args)?;
    let config = Config::from_args(&cli.config)?;
    Ok(run_daemon(&config, LaunchMode::detect(cli.foreground))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_foreground_and_shared_flags() {
        let cli = DaemonCli::try_parse_from([
            "mqd",
            "--foreground",
            "--cpu-budget",
            "3",
            "--daemon-socket",
            "/tmp/mq-test/mqd.sock",
        ])
        .expect("parse");
        assert!(cli.foreground);
        assert_eq!(cli.config.cpu_budget, Some(3));
        assert!(cli.config.daemon_socket.is_some());
    }

    #[rstest]
    fn rejects_zero_budget_before_launching() {
        let error = run(["mqd", "--foreground", "--cpu-budget", "0"]).expect_err("zero budget");
        assert!(matches!(
            error,
            DaemonError::Config(ConfigError::ZeroCpuBudget)
        ));
    }

    #[rstest]
    fn rejects_unknown_flags() {
        let error = run(["mqd", "--no-such-flag"]).expect_err("unknown flag");
        assert!(matches!(error, DaemonError::Cli(_)));
    }
}

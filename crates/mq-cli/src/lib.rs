//! Command-line client for the `mqd` job queue daemon.
//!
//! The client turns its trailing arguments into a single request, delivers it
//! over the daemon's Unix socket and relays the tagged reply: `OUT` lines to
//! stdout, `ERR` lines to stderr, and the terminal `OK`/`KO` as the exit
//! status. When nothing is listening it starts the daemon first.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mq_config::Config;
use mq_protocol::encode_request;

mod cli;
mod errors;
mod lifecycle;
mod relay;
mod transport;

#[cfg(test)]
mod tests;

use cli::Cli;
use errors::{AppError, is_daemon_not_running};
use lifecycle::{AutoStart, STARTUP_TIMEOUT, resolve_daemon_binary};
pub use lifecycle::{DAEMON_BIN_ENV_VAR, LifecycleError};

/// Runs the client with the production daemon binary resolution.
#[must_use]
pub fn run<I, T, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    Client::new().run(args, stdout, stderr)
}

/// Client runtime with an injectable daemon binary.
#[derive(Debug, Clone)]
pub struct Client {
    daemon_binary: Option<OsString>,
    startup_timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Resolves the daemon from [`DAEMON_BIN_ENV_VAR`] or `PATH` when needed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            daemon_binary: None,
            startup_timeout: STARTUP_TIMEOUT,
        }
    }

    /// Spawns `binary` instead when the daemon must be started.
    #[must_use]
    pub fn with_daemon_binary(mut self, binary: impl Into<OsString>) -> Self {
        self.daemon_binary = Some(binary.into());
        self
    }

    /// Bounds how long an auto-started daemon may take to accept connections.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Parses `args` (program name first), sends the request and relays the
    /// reply. Usage errors exit with status 2.
    pub fn run<I, T, W, E>(&self, args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        W: Write,
        E: Write,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(error) => return report_usage(&error, stdout, stderr),
        };
        match self.execute(&cli, stdout, stderr) {
            Ok(code) => code,
            Err(error) => {
                drop(writeln!(stderr, "mq: {error}"));
                ExitCode::FAILURE
            }
        }
    }

    fn execute<W: Write, E: Write>(
        &self,
        cli: &Cli,
        stdout: &mut W,
        stderr: &mut E,
    ) -> Result<ExitCode, AppError> {
        let config = Config::from_args(&cli.config)?;
        let request = encode_request(&cli.request)?;
        let mut connection = self.connect(cli, &config, stderr)?;
        connection
            .write_all(&request)
            .map_err(AppError::SendRequest)?;
        let outcome = relay::relay(&connection, stdout, stderr)?;
        relay::exit_code(outcome, cli.is_exit())
    }

    /// Connects, starting the daemon and retrying once when nothing listens.
    fn connect<E: Write>(
        &self,
        cli: &Cli,
        config: &Config,
        stderr: &mut E,
    ) -> Result<UnixStream, AppError> {
        let endpoint = config.daemon_socket();
        match transport::connect(endpoint) {
            Ok(connection) => Ok(connection),
            Err(error) if is_daemon_not_running(&error) && cli.is_exit() => {
                Err(AppError::NotRunning {
                    endpoint: endpoint.to_string(),
                })
            }
            Err(error) if is_daemon_not_running(&error) => {
                let binary = resolve_daemon_binary(self.daemon_binary.as_deref());
                let forwarded = cli.config.to_arguments();
                AutoStart {
                    config,
                    forwarded: &forwarded,
                    binary: OsStr::new(&binary),
                    timeout: self.startup_timeout,
                }
                .run(stderr)?;
                transport::connect(endpoint)
            }
            Err(error) => Err(error),
        }
    }
}

fn report_usage<W: Write, E: Write>(
    error: &clap::Error,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode {
    let rendered = error.render().to_string();
    let written = if error.use_stderr() {
        stderr.write_all(rendered.as_bytes())
    } else {
        stdout.write_all(rendered.as_bytes())
    };
    drop(written);
    u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

//! Shared configuration for the `mq` client and the `mqd` daemon.
//!
//! Values are layered with the precedence command-line flag, environment
//! variable, configuration file, then built-in default. Both binaries embed
//! [`ConfigArgs`] in their own parsers so the flags stay identical.

mod defaults;
mod file;
mod logging;
mod runtime;
mod socket;

use std::ffi::{OsStr, OsString};
use std::num::NonZeroUsize;

use camino::Utf8PathBuf;
use clap::{Args, Parser};
use thiserror::Error;

pub use defaults::{
    APPLICATION_DIR, CONFIG_FILE_NAME, DEFAULT_LOG_FILTER, SOCKET_FILE_NAME, default_config_path,
    default_cpu_budget, default_log_filter, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

use file::FileConfig;

/// Configuration flags shared by both binaries.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file.
    #[arg(long, env = "MQ_CONFIG_PATH", value_name = "PATH")]
    pub config_path: Option<Utf8PathBuf>,
    /// Socket the daemon listens on (`unix:///path` or a bare path).
    #[arg(long, env = "MQ_DAEMON_SOCKET", value_name = "ENDPOINT")]
    pub daemon_socket: Option<SocketEndpoint>,
    /// Tracing filter expression.
    #[arg(long, env = "MQ_LOG_FILTER", value_name = "FILTER")]
    pub log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long, env = "MQ_LOG_FORMAT", value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
    /// Maximum number of jobs running at once.
    #[arg(long, env = "MQ_CPU_BUDGET", value_name = "COUNT")]
    pub cpu_budget: Option<usize>,
}

impl ConfigArgs {
    /// Renders the explicitly set values back into command-line flags.
    ///
    /// Used to forward the client's configuration to a daemon it spawns.
    #[must_use]
    pub fn to_arguments(&self) -> Vec<OsString> {
        let mut arguments = Vec::new();
        let mut push = |flag: &str, value: &OsStr| {
            arguments.push(OsString::from(flag));
            arguments.push(value.to_os_string());
        };
        if let Some(path) = &self.config_path {
            push("--config-path", path.as_os_str());
        }
        if let Some(endpoint) = &self.daemon_socket {
            push("--daemon-socket", OsStr::new(&endpoint.to_string()));
        }
        if let Some(filter) = &self.log_filter {
            push("--log-filter", OsStr::new(filter));
        }
        if let Some(format) = self.log_format {
            push("--log-format", OsStr::new(&format.to_string()));
        }
        if let Some(budget) = self.cpu_budget {
            push("--cpu-budget", OsStr::new(&budget.to_string()));
        }
        arguments
    }
}

#[derive(Debug, Parser)]
#[command(name = "mq", disable_help_subcommand = true)]
struct ConfigCli {
    #[command(flatten)]
    config: ConfigArgs,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line parsing failed.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadFile {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration file '{path}': {source}")]
    ParseFile {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A zero job budget would never run anything.
    #[error("cpu budget must be at least 1")]
    ZeroCpuBudget,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    daemon_socket: SocketEndpoint,
    log_filter: String,
    log_format: LogFormat,
    cpu_budget: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            cpu_budget: default_cpu_budget(),
        }
    }
}

impl Config {
    /// Starts a builder seeded with defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parses flags from `args` (program name first) and resolves every layer.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = ConfigCli::try_parse_from(args)?;
        Self::from_args(&cli.config)
    }

    /// Resolves already-parsed flags against the file layer and defaults.
    pub fn from_args(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let file = match &args.config_path {
            Some(path) => FileConfig::read(path, true)?,
            None => match default_config_path() {
                Some(path) => FileConfig::read(&path, false)?,
                None => FileConfig::default(),
            },
        };

        let budget = args.cpu_budget.or(file.cpu_budget);
        let cpu_budget = match budget {
            Some(count) => NonZeroUsize::new(count).ok_or(ConfigError::ZeroCpuBudget)?,
            None => default_cpu_budget(),
        };

        Ok(Self {
            daemon_socket: args
                .daemon_socket
                .clone()
                .or(file.daemon_socket)
                .unwrap_or_else(default_socket_endpoint),
            log_filter: args
                .log_filter
                .clone()
                .or(file.log_filter)
                .unwrap_or_else(|| default_log_filter().to_owned()),
            log_format: args
                .log_format
                .or(file.log_format)
                .unwrap_or_else(default_log_format),
            cpu_budget,
        })
    }

    /// Socket the daemon listens on.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Maximum number of concurrently running jobs.
    #[must_use]
    pub const fn cpu_budget(&self) -> NonZeroUsize {
        self.cpu_budget
    }
}

/// Builder for [`Config`], used by embedders and tests.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the daemon socket.
    #[must_use]
    pub fn daemon_socket(mut self, endpoint: SocketEndpoint) -> Self {
        self.config.daemon_socket = endpoint;
        self
    }

    /// Sets the log filter.
    #[must_use]
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Sets the log format.
    #[must_use]
    pub const fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Sets the job budget.
    #[must_use]
    pub const fn cpu_budget(mut self, budget: NonZeroUsize) -> Self {
        self.config.cpu_budget = budget;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

//! Argument definitions for the `mq` binary.

use clap::Parser;
use mq_config::ConfigArgs;

/// Verb whose reply may be cut short by the daemon shutting down.
pub(crate) const EXIT_VERB: &str = "exit";

/// `mq [config flags] <verb> [args...]`
#[derive(Debug, Parser)]
#[command(
    name = "mq",
    version,
    about = "Submit and manage jobs on the mqd job queue",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) config: ConfigArgs,
    /// The verb (`add`, `list`, `kill`, ...) followed by its arguments.
    #[arg(
        value_name = "VERB",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) request: Vec<String>,
}

impl Cli {
    pub(crate) fn verb(&self) -> &str {
        self.request.first().map_or("", String::as_str)
    }

    /// Whether the request asks the daemon to shut down.
    pub(crate) fn is_exit(&self) -> bool {
        self.verb() == EXIT_VERB
    }
}

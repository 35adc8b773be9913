//! Entry point for the `mqd` job queue daemon.

use std::io::{self, Write};
use std::process::ExitCode;

use mqd::DaemonError;

fn main() -> ExitCode {
    match mqd::run(std::env::args_os()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(DaemonError::Cli(error)) => error.exit(),
        Err(error) => {
            drop(writeln!(io::stderr().lock(), "mqd: {error}"));
            ExitCode::FAILURE
        }
    }
}

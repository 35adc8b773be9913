//! Entry point for the `mq` job queue client.
//!
//! All behaviour lives in [`mq_cli::run`]; the binary only hands it the real
//! arguments and standard streams.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    mq_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

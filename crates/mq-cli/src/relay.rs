//! Forwards a daemon response to the caller's terminal.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use mq_protocol::{Frame, FrameError, FrameReader, Status, Stream};

use crate::errors::AppError;

/// How the connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The daemon sent a terminal status.
    Status(Status),
    /// The daemon closed the connection first.
    Closed,
}

/// Copies `OUT` lines to `stdout` and `ERR` lines to `stderr` until the
/// terminal status arrives or the daemon hangs up.
pub(crate) fn relay<R, W, E>(
    source: R,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<Outcome, AppError>
where
    R: Read,
    W: Write,
    E: Write,
{
    let mut reader = FrameReader::new(source);
    let outcome = loop {
        match reader.read_frame() {
            Ok(Some(Frame::Line(line))) => {
                let sink: &mut dyn Write = match line.stream {
                    Stream::Out => &mut *stdout,
                    Stream::Err => &mut *stderr,
                };
                writeln!(sink, "{}", line.text).map_err(AppError::ForwardResponse)?;
            }
            Ok(Some(Frame::Status(status))) => break Outcome::Status(status),
            Ok(None) => break Outcome::Closed,
            Err(FrameError::Io(error)) if error.kind() == io::ErrorKind::ConnectionReset => {
                break Outcome::Closed;
            }
            Err(error) => return Err(error.into()),
        }
    };
    stdout.flush().map_err(AppError::ForwardResponse)?;
    stderr.flush().map_err(AppError::ForwardResponse)?;
    Ok(outcome)
}

/// Maps how the exchange ended onto the process exit status.
///
/// A hang-up is only acceptable after `exit`, which tears the daemon down
/// while the reply may still be in flight.
pub(crate) const fn exit_code(
    outcome: Outcome,
    shutting_down: bool,
) -> Result<ExitCode, AppError> {
    match outcome {
        Outcome::Status(Status::Ok) => Ok(ExitCode::SUCCESS),
        Outcome::Status(Status::Ko) => Ok(ExitCode::FAILURE),
        Outcome::Closed if shutting_down => Ok(ExitCode::SUCCESS),
        Outcome::Closed => Err(AppError::MissingStatus),
    }
}

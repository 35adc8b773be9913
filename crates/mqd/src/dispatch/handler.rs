//! Executes decoded commands against the supervisor.

use mq_protocol::{Response, decode_request};
use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::job::{LIST_HEADER, ProcessDriver};
use crate::registry::JobTable;
use crate::signals::SignalError;
use crate::supervisor::{JobsGuard, Supervisor};

use super::command::{Command, USAGE};
use super::errors::DispatchError;
use super::{DISPATCH_TARGET, VerbosityControl};

/// The answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Frames to send back.
    pub response: Response,
    /// Whether the daemon should stop once the response is flushed.
    pub shutdown: bool,
}

impl Dispatched {
    const fn reply(response: Response) -> Self {
        Self {
            response,
            shutdown: false,
        }
    }
}

/// Turns request bytes into responses.
#[derive(Debug)]
pub struct CommandDispatcher<V> {
    verbosity: V,
}

impl<V: VerbosityControl> CommandDispatcher<V> {
    /// Creates a dispatcher that toggles logging through `verbosity`.
    pub const fn new(verbosity: V) -> Self {
        Self { verbosity }
    }

    /// Decodes and executes one request.
    ///
    /// Only failure to mask `SIGCHLD` is returned as an error; everything
    /// else is reported to the client in the response.
    pub fn dispatch<D: ProcessDriver>(
        &self,
        supervisor: &mut Supervisor<D>,
        request: &[u8],
    ) -> Result<Dispatched, SignalError> {
        let parsed = decode_request(request)
            .map_err(DispatchError::from)
            .and_then(Command::parse);
        let command = match parsed {
            Ok(command) => command,
            Err(error) => return Ok(Dispatched::reply(reject(error))),
        };
        debug!(target: DISPATCH_TARGET, command = ?command, "dispatching request");

        let shutdown = command == Command::Exit;
        let mut jobs = supervisor.lock()?;
        let response = self
            .execute(&mut jobs, command)
            .unwrap_or_else(reject);
        Ok(Dispatched { response, shutdown })
    }

    fn execute<D: ProcessDriver>(
        &self,
        jobs: &mut JobsGuard<'_, D>,
        command: Command,
    ) -> Result<Response, DispatchError> {
        match command {
            Command::Add(argv) => {
                jobs.submit(argv)?;
                jobs.schedule();
            }
            Command::List => return Ok(listing(jobs.table())),
            Command::Move { uid, destination } => jobs.move_job(uid, destination)?,
            Command::Terminate(selection) => {
                jobs.signal(selection, Signal::SIGTERM)?;
            }
            Command::Kill(selection) => {
                jobs.signal(selection, Signal::SIGKILL)?;
            }
            Command::Remove(removal) => {
                jobs.remove(removal)?;
            }
            Command::Help => {
                let mut response = Response::ok();
                response.push_out(USAGE);
                return Ok(response);
            }
            Command::Debug => self.verbosity.set_verbose(true),
            Command::NoDebug => self.verbosity.set_verbose(false),
            Command::Exit => {
                info!(target: DISPATCH_TARGET, "shutdown requested by client");
                jobs.terminate_all(Signal::SIGTERM);
            }
        }
        Ok(Response::ok())
    }
}

fn listing(table: &JobTable) -> Response {
    let mut response = Response::ok();
    if table.is_empty() {
        return response;
    }
    response.push_out(LIST_HEADER);
    for job in table.iter() {
        response.push_out(job.render());
    }
    response
}

fn reject(error: DispatchError) -> Response {
    if let DispatchError::UnknownVerb { verb } = &error {
        warn!(target: DISPATCH_TARGET, verb = %verb, "unknown command");
        return Response::ko();
    }
    info!(target: DISPATCH_TARGET, error = %error, "request rejected");
    Response::failure(error)
}

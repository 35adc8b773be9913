//! Parsing of request argument vectors into typed commands.

use crate::job::JobId;
use crate::supervisor::{Removal, Selection};

use super::errors::DispatchError;

const MOVE_USAGE: &str = "move UID DEST";
const TERMINATE_USAGE: &str = "terminate UID|all";
const KILL_USAGE: &str = "kill UID|all";
const REMOVE_USAGE: &str = "remove UID|done";

/// Help text returned by `help` and `usage`.
pub const USAGE: &str = "\
usage: mq COMMAND [ARGS...]

commands:
  add CMD [ARGS...]        queue CMD for execution
  list, ls                 show every job in queue order
  move, mv UID DEST        move job UID to position DEST (0-based)
  terminate, term UID|all  send SIGTERM to a running job, or to all of them
  kill UID|all             send SIGKILL to a running job, or to all of them
  remove, rm UID|done      forget a job, or every finished job
  debug                    enable verbose daemon logging
  nodebug                  restore the configured log filter
  help, usage              show this text
  exit                     stop every job and shut the daemon down";

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Queue a command.
    Add(Vec<String>),
    /// Show every job.
    List,
    /// Relocate a job.
    Move {
        /// Job to move.
        uid: JobId,
        /// Destination position.
        destination: usize,
    },
    /// Send `SIGTERM`.
    Terminate(Selection),
    /// Send `SIGKILL`.
    Kill(Selection),
    /// Forget jobs.
    Remove(Removal),
    /// Return the help text.
    Help,
    /// Enable verbose logging.
    Debug,
    /// Disable verbose logging.
    NoDebug,
    /// Stop jobs and shut down.
    Exit,
}

impl Command {
    /// Parses `arguments`, whose first element is the verb.
    ///
    /// Surplus arguments to verbs that take none are ignored.
    pub fn parse(arguments: Vec<String>) -> Result<Self, DispatchError> {
        let mut arguments = arguments.into_iter();
        let verb = arguments.next().ok_or(DispatchError::EmptyRequest)?;
        let rest: Vec<String> = arguments.collect();
        match verb.as_str() {
            "add" if rest.is_empty() => Err(DispatchError::MissingCommand),
            "add" => Ok(Self::Add(rest)),
            "list" | "ls" => Ok(Self::List),
            "move" | "mv" => parse_move(&rest),
            "terminate" | "term" => {
                parse_selection(&rest, TERMINATE_USAGE).map(Self::Terminate)
            }
            "kill" => parse_selection(&rest, KILL_USAGE).map(Self::Kill),
            "remove" | "rm" => parse_removal(&rest).map(Self::Remove),
            "help" | "usage" => Ok(Self::Help),
            "debug" => Ok(Self::Debug),
            "nodebug" => Ok(Self::NoDebug),
            "exit" => Ok(Self::Exit),
            _ => Err(DispatchError::UnknownVerb { verb }),
        }
    }
}

fn parse_uid(argument: &str, usage: &'static str) -> Result<JobId, DispatchError> {
    argument
        .parse::<u64>()
        .map(JobId::new)
        .map_err(|_| DispatchError::Usage { usage })
}

fn parse_move(rest: &[String]) -> Result<Command, DispatchError> {
    let usage = || DispatchError::Usage { usage: MOVE_USAGE };
    let [uid, destination, ..] = rest else {
        return Err(usage());
    };
    Ok(Command::Move {
        uid: parse_uid(uid, MOVE_USAGE)?,
        destination: destination.parse().map_err(|_| usage())?,
    })
}

fn parse_selection(rest: &[String], usage: &'static str) -> Result<Selection, DispatchError> {
    match rest.first().map(String::as_str) {
        None => Err(DispatchError::Usage { usage }),
        Some("all") => Ok(Selection::All),
        Some(argument) => parse_uid(argument, usage).map(Selection::Job),
    }
}

fn parse_removal(rest: &[String]) -> Result<Removal, DispatchError> {
    match rest.first().map(String::as_str) {
        None => Err(DispatchError::Usage {
            usage: REMOVE_USAGE,
        }),
        Some("done") => Ok(Removal::Finished),
        Some(argument) => parse_uid(argument, REMOVE_USAGE).map(Removal::Job),
    }
}

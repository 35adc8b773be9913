//! Process primitives behind job execution and reaping.
//!
//! The [`ProcessDriver`] trait is the seam between job bookkeeping and the
//! operating system. [`SystemDriver`] forks and executes real children;
//! tests substitute a scripted double.

use std::ffi::{CString, NulError};
use std::os::raw::c_char;
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, SigSet, Signal, kill, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, getpgrp, getpid};
use thiserror::Error;
use tracing::debug;

use super::JOBS_TARGET;

/// Exit status reported when the child cannot execute its program.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Status change of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Normal exit with a status code.
    Exited {
        /// Child pid.
        pid: Pid,
        /// Exit status.
        code: i32,
    },
    /// Terminated by a signal.
    Killed {
        /// Child pid.
        pid: Pid,
        /// Terminating signal.
        signal: Signal,
    },
    /// Terminated by a signal with a core dump.
    Dumped {
        /// Child pid.
        pid: Pid,
        /// Terminating signal.
        signal: Signal,
    },
    /// Stopped by a signal.
    Stopped {
        /// Child pid.
        pid: Pid,
        /// Stopping signal.
        signal: Signal,
    },
    /// Resumed after a stop.
    Continued {
        /// Child pid.
        pid: Pid,
    },
}

impl ChildEvent {
    /// Pid the event concerns.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        match *self {
            Self::Exited { pid, .. }
            | Self::Killed { pid, .. }
            | Self::Dumped { pid, .. }
            | Self::Stopped { pid, .. }
            | Self::Continued { pid } => pid,
        }
    }

    /// Whether the child is gone for good.
    #[must_use]
    pub const fn is_termination(&self) -> bool {
        matches!(
            self,
            Self::Exited { .. } | Self::Killed { .. } | Self::Dumped { .. }
        )
    }
}

/// Outcome of a single non-blocking child poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPoll {
    /// A child changed state.
    Event(ChildEvent),
    /// Children exist but none changed state since the last poll.
    Idle,
    /// There are no children at all.
    NoChildren,
}

/// Errors raised while spawning a child.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// There was no program to execute.
    #[error("missing command")]
    EmptyCommand,
    /// An argument held an interior NUL byte.
    #[error("argument {index} contains a NUL byte")]
    InvalidArgument {
        /// Zero-based argument index.
        index: usize,
        /// Conversion failure.
        #[source]
        source: NulError,
    },
    /// `fork` failed, usually from resource exhaustion.
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
}

/// Operating-system operations needed to run and reap jobs.
pub trait ProcessDriver {
    /// Starts `argv` in a new child and returns its pid.
    fn spawn(&mut self, argv: &[String]) -> Result<Pid, SpawnError>;

    /// Delivers `signal` to `pid`.
    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno>;

    /// Delivers `signal` to the daemon's process group when the daemon leads
    /// it. Returns whether the group was signalled.
    fn signal_group(&mut self, signal: Signal) -> Result<bool, Errno>;

    /// Collects one child status change without blocking.
    fn poll_child(&mut self) -> Result<ChildPoll, Errno>;
}

/// Driver backed by `fork`, `execvp` and `waitpid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDriver;

impl SystemDriver {
    /// Creates the driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessDriver for SystemDriver {
    fn spawn(&mut self, argv: &[String]) -> Result<Pid, SpawnError> {
        // Everything the child touches is allocated before forking.
        let arguments = argv
            .iter()
            .enumerate()
            .map(|(index, argument)| {
                CString::new(argument.as_str())
                    .map_err(|source| SpawnError::InvalidArgument { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let program = arguments.first().ok_or(SpawnError::EmptyCommand)?;
        let mut pointers: Vec<*const c_char> =
            arguments.iter().map(|argument| argument.as_ptr()).collect();
        pointers.push(ptr::null());

        // SAFETY: the child only makes async-signal-safe calls before `execvp`
        // or `_exit`, and every buffer it reads was prepared above.
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => {
                let _cleared = SigSet::empty().thread_set_mask();
                // SAFETY: restoring the default disposition in the child only.
                let _restored = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
                // SAFETY: `program` and `pointers` are NUL-terminated and
                // outlive the call; `_exit` skips destructors of the parent's
                // state.
                unsafe {
                    libc::execvp(program.as_ptr(), pointers.as_ptr());
                    libc::_exit(EXEC_FAILURE_STATUS)
                }
            }
        }
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno> {
        kill(pid, signal)
    }

    fn signal_group(&mut self, signal: Signal) -> Result<bool, Errno> {
        let group = getpgrp();
        if group != getpid() {
            return Ok(false);
        }
        killpg(group, signal).map(|()| true)
    }

    fn poll_child(&mut self) -> Result<ChildPoll, Errno> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            let event = match waitpid(Pid::from_raw(-1), Some(flags)) {
                Ok(WaitStatus::StillAlive) => return Ok(ChildPoll::Idle),
                Ok(WaitStatus::Exited(pid, code)) => ChildEvent::Exited { pid, code },
                Ok(WaitStatus::Signaled(pid, signal, true)) => ChildEvent::Dumped { pid, signal },
                Ok(WaitStatus::Signaled(pid, signal, false)) => ChildEvent::Killed { pid, signal },
                Ok(WaitStatus::Stopped(pid, signal)) => ChildEvent::Stopped { pid, signal },
                Ok(WaitStatus::Continued(pid)) => ChildEvent::Continued { pid },
                Ok(other) => {
                    debug!(target: JOBS_TARGET, status = ?other, "ignoring trace status");
                    continue;
                }
                Err(Errno::ECHILD) => return Ok(ChildPoll::NoChildren),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno),
            };
            return Ok(ChildPoll::Event(event));
        }
    }
}

//! Signal discipline for the event loop.
//!
//! Two mechanisms cooperate here. [`CriticalSection`] blocks `SIGCHLD` on the
//! loop thread for as long as the job table is being touched, so child
//! termination is never observed half way through a mutation. [`SignalWake`]
//! turns `SIGCHLD` and termination requests into readable bytes on a socket
//! registered with the readiness loop, so the handlers themselves never touch
//! daemon state.

use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use signal_hook::consts::signal::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::low_level::{pipe, unregister};
use signal_hook::{SigId, flag};
use thiserror::Error;
use tracing::warn;

pub(crate) const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Signals that ask the daemon to shut down.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors raised while installing or operating the signal plumbing.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Changing the thread signal mask failed.
    #[error("failed to change signal mask: {0}")]
    Mask(#[source] Errno),
    /// Creating the wake socket pair failed.
    #[error("failed to create signal wake pipe: {0}")]
    Pipe(#[source] io::Error),
    /// Installing a handler failed.
    #[error("failed to register handler for signal {signal}: {source}")]
    Register {
        /// Raw signal number.
        signal: i32,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Reading wake bytes failed.
    #[error("failed to drain signal wake pipe: {0}")]
    Drain(#[source] io::Error),
}

/// Keeps `SIGCHLD` blocked on the current thread until dropped.
///
/// Sections nest: each guard restores the mask it found.
#[derive(Debug)]
pub struct CriticalSection {
    previous: SigSet,
}

impl CriticalSection {
    /// Blocks `SIGCHLD` on the calling thread.
    pub fn enter() -> Result<Self, SignalError> {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGCHLD);
        let previous = blocked
            .thread_swap_mask(SigmaskHow::SIG_BLOCK)
            .map_err(SignalError::Mask)?;
        Ok(Self { previous })
    }

    /// Whether `SIGCHLD` is currently blocked on the calling thread.
    pub fn child_signal_blocked() -> Result<bool, SignalError> {
        let current = SigSet::thread_get_mask().map_err(SignalError::Mask)?;
        Ok(current.contains(Signal::SIGCHLD))
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Err(errno) = self.previous.thread_set_mask() {
            warn!(
                target: SIGNALS_TARGET,
                error = %errno,
                "failed to restore signal mask"
            );
        }
    }
}

/// Self-pipe fed by signal handlers, plus the shutdown flag.
#[derive(Debug)]
pub struct SignalWake {
    reader: UnixStream,
    shutdown: Arc<AtomicBool>,
    registrations: Vec<SigId>,
}

impl SignalWake {
    /// Installs handlers for `SIGCHLD` and [`TERMINATION_SIGNALS`].
    pub fn install() -> Result<Self, SignalError> {
        let (reader, writer) = UnixStream::pair().map_err(SignalError::Pipe)?;
        reader.set_nonblocking(true).map_err(SignalError::Pipe)?;
        writer.set_nonblocking(true).map_err(SignalError::Pipe)?;

        let mut wake = Self {
            reader,
            shutdown: Arc::new(AtomicBool::new(false)),
            registrations: Vec::new(),
        };
        wake.register_pipe(SIGCHLD, &writer)?;
        for signal in TERMINATION_SIGNALS {
            let id = flag::register(signal, Arc::clone(&wake.shutdown))
                .map_err(|source| SignalError::Register { signal, source })?;
            wake.registrations.push(id);
            wake.register_pipe(signal, &writer)?;
        }
        Ok(wake)
    }

    fn register_pipe(&mut self, signal: i32, writer: &UnixStream) -> Result<(), SignalError> {
        let id = writer
            .try_clone()
            .and_then(|clone| pipe::register(signal, clone))
            .map_err(|source| SignalError::Register { signal, source })?;
        self.registrations.push(id);
        Ok(())
    }

    /// Consumes every pending wake byte and returns how many there were.
    pub fn drain(&self) -> Result<usize, SignalError> {
        let mut buffer = [0_u8; 64];
        let mut total = 0;
        loop {
            match (&self.reader).read(&mut buffer) {
                Ok(0) => return Ok(total),
                Ok(count) => total += count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(SignalError::Drain(error)),
            }
        }
    }

    /// Whether a termination signal has arrived.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Shared flag set by termination handlers.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

impl AsFd for SignalWake {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl Drop for SignalWake {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            unregister(id);
        }
    }
}

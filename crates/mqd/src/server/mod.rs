//! The readiness loop.
//!
//! A single thread waits on the listening socket, the signal wake pipe and
//! every client socket. Each connection carries exactly one request and one
//! response: it is registered for read readiness until a full request has
//! arrived, then for write readiness until the response has been flushed,
//! then closed. Every iteration also reaps finished children and runs a
//! scheduling pass, so the queue drains even when no client is talking.

mod connection;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mq_protocol::{MAX_REQUEST_BYTES, RequestError, Response};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{debug, info};

use crate::dispatch::{CommandDispatcher, Dispatched, VerbosityControl};
use crate::job::ProcessDriver;
use crate::reaper::ReapError;
use crate::signals::{SignalError, SignalWake};
use crate::supervisor::Supervisor;
use crate::transport::SocketListener;

use self::connection::{Connection, Outbox, ReadProgress};

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Upper bound on readiness events handled per iteration.
pub const MAX_EVENTS: usize = 64;

/// Longest wait before the loop reaps and schedules again.
pub const POLL_TIMEOUT_MS: u16 = 1000;

const LISTENER_TOKEN: u64 = 0;
const WAKE_TOKEN: u64 = 1;
const FIRST_CLIENT_TOKEN: u64 = 2;

/// Fatal loop failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The epoll instance could not be created.
    #[error("failed to create epoll instance: {0}")]
    Epoll(#[source] Errno),
    /// A descriptor could not be added or re-registered.
    #[error("failed to register descriptor with epoll: {0}")]
    Register(#[source] Errno),
    /// The readiness wait failed.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] Errno),
    /// The listener could not accept a pending connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    /// Signal plumbing failed.
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// The job table is inconsistent with the children the kernel reported.
    #[error(transparent)]
    Reap(#[from] ReapError),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A client sent `exit`.
    ExitCommand,
    /// A termination signal arrived.
    Signal,
}

/// The daemon's event loop and everything it owns.
#[derive(Debug)]
pub struct Server<D, V> {
    epoll: Epoll,
    listener: SocketListener,
    wake: SignalWake,
    connections: HashMap<u64, Connection>,
    outbox: Outbox,
    supervisor: Supervisor<D>,
    dispatcher: CommandDispatcher<V>,
    next_token: u64,
}

impl<D: ProcessDriver, V: VerbosityControl> Server<D, V> {
    /// Installs signal handlers and registers the listener.
    pub fn new(
        listener: SocketListener,
        supervisor: Supervisor<D>,
        dispatcher: CommandDispatcher<V>,
    ) -> Result<Self, ServerError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(ServerError::Epoll)?;
        let wake = SignalWake::install()?;
        epoll
            .add(&listener, EpollEvent::new(EpollFlags::EPOLLIN, LISTENER_TOKEN))
            .map_err(ServerError::Register)?;
        epoll
            .add(&wake, EpollEvent::new(EpollFlags::EPOLLIN, WAKE_TOKEN))
            .map_err(ServerError::Register)?;
        Ok(Self {
            epoll,
            listener,
            wake,
            connections: HashMap::new(),
            outbox: Outbox::default(),
            supervisor,
            dispatcher,
            next_token: FIRST_CLIENT_TOKEN,
        })
    }

    /// Path clients connect to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.listener.path()
    }

    /// Flag raised by termination signals. Setting it stops the loop at the
    /// next iteration.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.wake.shutdown_flag()
    }

    /// Runs until `exit` or a termination signal.
    pub fn run(&mut self) -> Result<StopReason, ServerError> {
        info!(
            target: SERVER_TARGET,
            cpu_budget = self.supervisor.cpu_budget().get(),
            "accepting requests"
        );
        let mut events = [EpollEvent::empty(); MAX_EVENTS];
        loop {
            if let Some(reason) = self.turn(&mut events)? {
                info!(target: SERVER_TARGET, reason = ?reason, "event loop stopped");
                return Ok(reason);
            }
        }
    }

    fn turn(&mut self, events: &mut [EpollEvent]) -> Result<Option<StopReason>, ServerError> {
        let ready = match self.epoll.wait(events, POLL_TIMEOUT_MS) {
            Ok(count) => count,
            Err(Errno::EINTR) => return Ok(None),
            Err(errno) => return Err(ServerError::Wait(errno)),
        };

        self.wake.drain()?;
        if self.wake.shutdown_requested() {
            info!(target: SERVER_TARGET, "termination signal received");
            self.supervisor.lock()?.terminate_all(Signal::SIGTERM);
            return Ok(Some(StopReason::Signal));
        }
        {
            let mut jobs = self.supervisor.lock()?;
            jobs.reap()?;
            jobs.schedule();
        }

        for event in events.iter().take(ready) {
            let token = event.data();
            match token {
                LISTENER_TOKEN => self.accept()?,
                WAKE_TOKEN => {}
                _ => {
                    if let Some(reason) = self.service(token, event.events())? {
                        return Ok(Some(reason));
                    }
                }
            }
        }
        Ok(None)
    }

    fn accept(&mut self) -> Result<(), ServerError> {
        let Some(stream) = self.listener.accept().map_err(ServerError::Accept)? else {
            return Ok(());
        };
        let token = self.next_token;
        self.next_token += 1;
        self.epoll
            .add(&stream, EpollEvent::new(EpollFlags::EPOLLIN, token))
            .map_err(ServerError::Register)?;
        debug!(target: SERVER_TARGET, token, "accepted connection");
        self.connections.insert(token, Connection::new(stream));
        Ok(())
    }

    fn service(
        &mut self,
        token: u64,
        flags: EpollFlags,
    ) -> Result<Option<StopReason>, ServerError> {
        if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            debug!(target: SERVER_TARGET, token, "client hung up");
            self.close(token);
            return Ok(None);
        }
        let Some(connection) = self.connections.get(&token) else {
            return Ok(None);
        };
        if connection.is_dispatched() {
            if flags.contains(EpollFlags::EPOLLOUT) {
                self.write_pending(token);
            }
            return Ok(None);
        }
        if flags.contains(EpollFlags::EPOLLIN) {
            return self.read_request(token);
        }
        Ok(None)
    }

    fn read_request(&mut self, token: u64) -> Result<Option<StopReason>, ServerError> {
        let Some(connection) = self.connections.get_mut(&token) else {
            return Ok(None);
        };
        let progress = match connection.fill() {
            Ok(progress) => progress,
            Err(error) => {
                debug!(target: SERVER_TARGET, token, error = %error, "read failed");
                self.close(token);
                return Ok(None);
            }
        };
        let dispatched = match progress {
            ReadProgress::Pending => return Ok(None),
            ReadProgress::Closed => {
                self.close(token);
                return Ok(None);
            }
            ReadProgress::Oversized => Dispatched {
                response: Response::failure(RequestError::TooLarge {
                    limit: MAX_REQUEST_BYTES,
                }),
                shutdown: false,
            },
            ReadProgress::Complete => self
                .dispatcher
                .dispatch(&mut self.supervisor, connection.request())?,
        };

        self.outbox.enqueue(token, &dispatched.response);
        if let Some(connection) = self.connections.get_mut(&token) {
            connection.mark_dispatched();
            self.epoll
                .modify(
                    connection.stream(),
                    &mut EpollEvent::new(EpollFlags::EPOLLOUT, token),
                )
                .map_err(ServerError::Register)?;
        }

        if dispatched.shutdown {
            // The peer may see the response or just the close; both mean done.
            self.write_pending(token);
            self.close(token);
            return Ok(Some(StopReason::ExitCommand));
        }
        Ok(None)
    }

    fn write_pending(&mut self, token: u64) {
        let (Some(connection), Some(message)) =
            (self.connections.get(&token), self.outbox.get_mut(token))
        else {
            return;
        };
        match message.flush(connection.stream()) {
            Ok(true) => {
                debug!(target: SERVER_TARGET, token, "response sent");
                self.close(token);
            }
            Ok(false) => {}
            Err(error) => {
                debug!(target: SERVER_TARGET, token, error = %error, "write failed");
                self.close(token);
            }
        }
    }

    fn close(&mut self, token: u64) {
        self.outbox.discard(token);
        let Some(connection) = self.connections.remove(&token) else {
            return;
        };
        if let Err(errno) = self.epoll.delete(connection.stream()) {
            debug!(target: SERVER_TARGET, token, error = %errno, "failed to deregister client");
        }
    }
}

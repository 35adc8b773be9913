//! Test doubles shared by the unit and behaviour suites.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mq_protocol::{Frame, FrameReader, encode_request};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::dispatch::VerbosityControl;
use crate::job::{ChildEvent, ChildPoll, ProcessDriver, SpawnError};

const FIRST_PID: i32 = 1000;

#[derive(Debug)]
struct Script {
    next_pid: i32,
    spawn_failures: usize,
    poll_failure: Option<Errno>,
    live: Vec<Pid>,
    spawned: Vec<(Pid, Vec<String>)>,
    signals: Vec<(Pid, Signal)>,
    group_signals: Vec<Signal>,
    events: VecDeque<ChildEvent>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            next_pid: FIRST_PID,
            spawn_failures: 0,
            poll_failure: None,
            live: Vec::new(),
            spawned: Vec::new(),
            signals: Vec::new(),
            group_signals: Vec::new(),
            events: VecDeque::new(),
        }
    }
}

/// Process driver that fabricates children.
///
/// Clones share the same script, so a test can keep a handle after moving
/// the driver into a supervisor. Signals sent to a live child terminate it
/// immediately and queue the matching termination for the next poll.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }

    /// Makes the next `count` spawns fail as if `fork` hit `EAGAIN`.
    pub fn fail_spawns(&self, count: usize) {
        self.script().spawn_failures = count;
    }

    /// Makes the next poll fail with `errno`.
    pub fn fail_next_poll(&self, errno: Errno) {
        self.script().poll_failure = Some(errno);
    }

    /// Every successful spawn so far.
    pub fn spawned(&self) -> Vec<(Pid, Vec<String>)> {
        self.script().spawned.clone()
    }

    /// Every signal delivered to an individual child.
    pub fn signals(&self) -> Vec<(Pid, Signal)> {
        self.script().signals.clone()
    }

    /// Every signal delivered to the process group.
    pub fn group_signals(&self) -> Vec<Signal> {
        self.script().group_signals.clone()
    }

    /// Children that have not terminated yet.
    pub fn live(&self) -> Vec<Pid> {
        self.script().live.clone()
    }

    /// Pid of the most recent spawn of `program`.
    pub fn pid_of(&self, program: &str) -> Option<Pid> {
        self.script()
            .spawned
            .iter()
            .rev()
            .find(|(_, argv)| argv.first().is_some_and(|first| first == program))
            .map(|(pid, _)| *pid)
    }

    /// Terminates `pid` with a normal exit.
    pub fn exit(&self, pid: Pid, code: i32) {
        let mut script = self.script();
        script.live.retain(|live| *live != pid);
        script.events.push_back(ChildEvent::Exited { pid, code });
    }

    /// Queues an arbitrary status change.
    pub fn push_event(&self, event: ChildEvent) {
        let mut script = self.script();
        if event.is_termination() {
            script.live.retain(|live| *live != event.pid());
        }
        script.events.push_back(event);
    }
}

impl ProcessDriver for ScriptedDriver {
    fn spawn(&mut self, argv: &[String]) -> Result<Pid, SpawnError> {
        if argv.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }
        let mut script = self.script();
        if script.spawn_failures > 0 {
            script.spawn_failures -= 1;
            return Err(SpawnError::Fork(Errno::EAGAIN));
        }
        let pid = Pid::from_raw(script.next_pid);
        script.next_pid += 1;
        script.live.push(pid);
        script.spawned.push((pid, argv.to_vec()));
        Ok(pid)
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno> {
        let mut script = self.script();
        if !script.live.contains(&pid) {
            return Err(Errno::ESRCH);
        }
        script.signals.push((pid, signal));
        script.live.retain(|live| *live != pid);
        script.events.push_back(ChildEvent::Killed { pid, signal });
        Ok(())
    }

    fn signal_group(&mut self, signal: Signal) -> Result<bool, Errno> {
        self.script().group_signals.push(signal);
        Ok(true)
    }

    fn poll_child(&mut self) -> Result<ChildPoll, Errno> {
        let mut script = self.script();
        if let Some(errno) = script.poll_failure.take() {
            return Err(errno);
        }
        Ok(match script.events.pop_front() {
            Some(event) => ChildPoll::Event(event),
            None if script.live.is_empty() => ChildPoll::NoChildren,
            None => ChildPoll::Idle,
        })
    }
}

/// Verbosity control that records every toggle.
#[derive(Debug, Clone, Default)]
pub struct RecordingVerbosity {
    toggles: Arc<Mutex<Vec<bool>>>,
}

impl RecordingVerbosity {
    /// Toggles seen so far, oldest first.
    pub fn toggles(&self) -> Vec<bool> {
        self.toggles.lock().expect("toggle lock").clone()
    }
}

impl VerbosityControl for RecordingVerbosity {
    fn set_verbose(&self, enabled: bool) {
        self.toggles.lock().expect("toggle lock").push(enabled);
    }
}

/// Frames returned by the daemon for one request.
#[derive(Debug, Default)]
pub struct Exchange {
    /// Every frame, in arrival order.
    pub frames: Vec<Frame>,
}

/// Sends one request over `socket` and collects frames until the daemon
/// closes the connection.
pub fn exchange(socket: &Path, arguments: &[&str]) -> Exchange {
    let mut stream = UnixStream::connect(socket).expect("connect to daemon");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    let owned: Vec<String> = arguments.iter().map(|arg| (*arg).to_owned()).collect();
    let request = encode_request(&owned).expect("encode request");
    stream.write_all(&request).expect("write request");
    exchange_frames(stream)
}

/// Writes raw bytes instead of an encoded request, then closes the write
/// half so the daemon sees end of input.
pub fn exchange_raw(socket: &Path, bytes: &[u8]) -> Exchange {
    let mut stream = UnixStream::connect(socket).expect("connect to daemon");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    stream.write_all(bytes).expect("write request");
    stream.shutdown(Shutdown::Write).expect("close write half");
    exchange_frames(stream)
}

fn exchange_frames(stream: impl Read) -> Exchange {
    let mut reader = FrameReader::new(stream);
    let mut frames = Vec::new();
    while let Some(frame) = reader.read_frame().expect("read frame") {
        frames.push(frame);
    }
    Exchange { frames }
}

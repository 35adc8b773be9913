//! A submitted command and its lifecycle.
//!
//! Jobs start in [`JobState::Waiting`], move to [`JobState::Running`] exactly
//! once when a child is spawned for them, and end in one of the terminal
//! states once the reaper observes the child's termination.

mod driver;
mod render;

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

pub use driver::{ChildEvent, ChildPoll, ProcessDriver, SpawnError, SystemDriver};
pub use render::{LIST_HEADER, LINE_WIDTH, TRUNCATION_MARKER};

pub(crate) const JOBS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::jobs");

/// Stable job identity, independent of the job's position in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Queued, not yet started.
    Waiting,
    /// A child process is executing the command.
    Running,
    /// The child exited normally.
    Exited,
    /// The child was terminated by a signal.
    Killed,
    /// The child was terminated by a signal and dumped core.
    Dumped,
    /// Reserved for suspension; never entered by the daemon.
    Stopped,
}

impl JobState {
    /// Abbreviation shown in listings.
    #[must_use]
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Waiting => "W",
            Self::Running => "R*",
            Self::Exited => "C",
            Self::Killed => "K",
            Self::Dumped => "D",
            Self::Stopped => "S",
        }
    }

    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Killed | Self::Dumped)
    }
}

/// Per-job failures. None of these are fatal to the daemon.
#[derive(Debug, Error)]
pub enum JobError {
    /// A job needs at least a program name.
    #[error("missing command")]
    EmptyCommand,
    /// The job is not in the state the operation requires.
    #[error("job {uid} is {state:?}, expected {expected:?}")]
    UnexpectedState {
        /// Job identity.
        uid: JobId,
        /// Actual state.
        state: JobState,
        /// State the operation requires.
        expected: JobState,
    },
    /// Spawning the child failed; the job stays waiting.
    #[error("failed to start job {uid}: {source}")]
    Spawn {
        /// Job identity.
        uid: JobId,
        /// Underlying failure.
        #[source]
        source: SpawnError,
    },
    /// Delivering a signal failed.
    #[error("failed to send {signal} to job {uid}: {source}")]
    Signal {
        /// Job identity.
        uid: JobId,
        /// Signal being delivered.
        signal: Signal,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}

/// One submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    uid: JobId,
    argv: Vec<String>,
    state: JobState,
    pid: Option<Pid>,
    exit_code: Option<i32>,
    remove_on_exit: bool,
}

impl Job {
    /// Creates a waiting job. `argv` must name at least a program.
    pub fn new(uid: JobId, argv: Vec<String>) -> Result<Self, JobError> {
        if argv.is_empty() {
            return Err(JobError::EmptyCommand);
        }
        Ok(Self {
            uid,
            argv,
            state: JobState::Waiting,
            pid: None,
            exit_code: None,
            remove_on_exit: false,
        })
    }

    /// Stable identity.
    #[must_use]
    pub const fn uid(&self) -> JobId {
        self.uid
    }

    /// Program and arguments.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Child pid, set once the job has started.
    #[must_use]
    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Exit status, or the terminating signal number for killed jobs.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether the job should be dropped from the table once it finishes.
    #[must_use]
    pub const fn remove_on_exit(&self) -> bool {
        self.remove_on_exit
    }

    /// Flags the job for removal once it reaches a terminal state.
    pub fn mark_for_removal(&mut self) {
        self.remove_on_exit = true;
    }

    /// Starts the job's child process.
    ///
    /// On failure the job stays [`JobState::Waiting`] so a later pass can
    /// retry it.
    pub fn run<D>(&mut self, driver: &mut D) -> Result<Pid, JobError>
    where
        D: ProcessDriver + ?Sized,
    {
        self.expect_state(JobState::Waiting)?;
        let pid = driver.spawn(&self.argv).map_err(|source| JobError::Spawn {
            uid: self.uid,
            source,
        })?;
        self.pid = Some(pid);
        self.state = JobState::Running;
        debug!(
            target: JOBS_TARGET,
            uid = %self.uid,
            pid = pid.as_raw(),
            "job started"
        );
        Ok(pid)
    }

    /// Records the termination of the job's child.
    pub fn wait_result(&mut self, event: ChildEvent) -> Result<(), JobError> {
        self.expect_state(JobState::Running)?;
        let (state, code) = match event {
            ChildEvent::Exited { code, .. } => (JobState::Exited, code),
            ChildEvent::Killed { signal, .. } => (JobState::Killed, signal as i32),
            ChildEvent::Dumped { signal, .. } => (JobState::Dumped, signal as i32),
            ChildEvent::Stopped { .. } | ChildEvent::Continued { .. } => return Ok(()),
        };
        self.state = state;
        self.exit_code = Some(code);
        debug!(
            target: JOBS_TARGET,
            uid = %self.uid,
            state = state.abbreviation(),
            code,
            "job finished"
        );
        Ok(())
    }

    /// Sends `signal` to the job's child. Jobs that are not running are left
    /// alone.
    pub fn kill<D>(&self, driver: &mut D, signal: Signal) -> Result<(), JobError>
    where
        D: ProcessDriver + ?Sized,
    {
        let (JobState::Running, Some(pid)) = (self.state, self.pid) else {
            return Ok(());
        };
        driver.signal(pid, signal).map_err(|source| JobError::Signal {
            uid: self.uid,
            signal,
            source,
        })
    }

    /// Fixed-width listing line.
    #[must_use]
    pub fn render(&self) -> String {
        render::render_job(self)
    }

    fn expect_state(&self, expected: JobState) -> Result<(), JobError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(JobError::UnexpectedState {
                uid: self.uid,
                state: self.state,
                expected,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ScriptedDriver;
    use rstest::{fixture, rstest};

    #[fixture]
    fn job() -> Job {
        Job::new(JobId::new(0), vec!["sleep".into(), "5".into()]).expect("job")
    }

    #[rstest]
    fn empty_argv_is_rejected() {
        let error = Job::new(JobId::new(1), Vec::new()).expect_err("must fail");
        assert!(matches!(error, JobError::EmptyCommand));
    }

    #[rstest]
    fn new_jobs_wait_without_pid(job: Job) {
        assert_eq!(job.state(), JobState::Waiting);
        assert_eq!(job.pid(), None);
        assert_eq!(job.exit_code(), None);
    }

    #[rstest]
    fn run_records_pid_once(mut job: Job) {
        let mut driver = ScriptedDriver::default();
        let pid = job.run(&mut driver).expect("run");
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.pid(), Some(pid));

        let error = job.run(&mut driver).expect_err("second run must fail");
        assert!(matches!(error, JobError::UnexpectedState { .. }));
        assert_eq!(job.pid(), Some(pid));
        assert_eq!(driver.spawned().len(), 1);
    }

    #[rstest]
    fn spawn_failure_keeps_job_waiting(mut job: Job) {
        let mut driver = ScriptedDriver::default();
        driver.fail_spawns(1);
        let error = job.run(&mut driver).expect_err("spawn must fail");
        assert!(matches!(error, JobError::Spawn { .. }));
        assert_eq!(job.state(), JobState::Waiting);
        assert_eq!(job.pid(), None);
    }

    #[rstest]
    #[case::exited(ChildEvent::Exited { pid: Pid::from_raw(1), code: 3 }, JobState::Exited, 3)]
    #[case::killed(
        ChildEvent::Killed { pid: Pid::from_raw(1), signal: Signal::SIGKILL },
        JobState::Killed,
        9
    )]
    #[case::dumped(
        ChildEvent::Dumped { pid: Pid::from_raw(1), signal: Signal::SIGSEGV },
        JobState::Dumped,
        11
    )]
    fn wait_result_maps_termination(
        mut job: Job,
        #[case] event: ChildEvent,
        #[case] state: JobState,
        #[case] code: i32,
    ) {
        let mut driver = ScriptedDriver::default();
        job.run(&mut driver).expect("run");
        job.wait_result(event).expect("wait");
        assert_eq!(job.state(), state);
        assert_eq!(job.exit_code(), Some(code));
    }

    #[rstest]
    fn wait_result_requires_running(mut job: Job) {
        let error = job
            .wait_result(ChildEvent::Exited {
                pid: Pid::from_raw(1),
                code: 0,
            })
            .expect_err("must fail");
        assert!(matches!(
            error,
            JobError::UnexpectedState {
                expected: JobState::Running,
                ..
            }
        ));
    }

    #[rstest]
    fn kill_ignores_jobs_that_are_not_running(job: Job) {
        let mut driver = ScriptedDriver::default();
        job.kill(&mut driver, Signal::SIGKILL).expect("no-op");
        assert!(driver.signals().is_empty());
    }

    #[rstest]
    fn kill_signals_running_child(mut job: Job) {
        let mut driver = ScriptedDriver::default();
        let pid = job.run(&mut driver).expect("run");
        job.kill(&mut driver, Signal::SIGTERM).expect("kill");
        assert_eq!(driver.signals(), vec![(pid, Signal::SIGTERM)]);
    }
}

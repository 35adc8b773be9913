//! Exclusive access to the job table.
//!
//! The table is only reachable through [`JobsGuard`], which keeps `SIGCHLD`
//! blocked on the loop thread while it lives. Scheduling, reaping, signalling
//! and queue edits therefore never interleave with child termination
//! notifications.

use std::num::NonZeroUsize;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{info, warn};

use crate::job::{JOBS_TARGET, JobError, JobId, JobState, ProcessDriver};
use crate::reaper::{self, ReapError};
use crate::registry::{JobTable, RegistryError, StateFilter};
use crate::scheduler::{self, ScheduleReport};
use crate::signals::{CriticalSection, SignalError};

/// Which jobs a signalling command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every running job.
    All,
    /// A single job.
    Job(JobId),
}

/// Which jobs a removal targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Every job in a terminal state.
    Finished,
    /// A single job.
    Job(JobId),
}

/// Per-request queue failures, reported back to the client.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No job carries the identity.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// A position was out of range.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The job refused the operation.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Owner of the job table and the process driver.
#[derive(Debug)]
pub struct Supervisor<D> {
    table: JobTable,
    driver: D,
    cpu_budget: NonZeroUsize,
}

impl<D: ProcessDriver> Supervisor<D> {
    /// Creates a supervisor with an empty table.
    pub fn new(driver: D, cpu_budget: NonZeroUsize) -> Self {
        Self {
            table: JobTable::new(),
            driver,
            cpu_budget,
        }
    }

    /// Maximum number of concurrently running jobs.
    #[must_use]
    pub const fn cpu_budget(&self) -> NonZeroUsize {
        self.cpu_budget
    }

    /// Blocks `SIGCHLD` and hands out the table.
    pub fn lock(&mut self) -> Result<JobsGuard<'_, D>, SignalError> {
        let section = CriticalSection::enter()?;
        Ok(JobsGuard {
            _section: section,
            table: &mut self.table,
            driver: &mut self.driver,
            cpu_budget: self.cpu_budget,
        })
    }
}

/// Table access held while `SIGCHLD` is blocked.
#[derive(Debug)]
pub struct JobsGuard<'a, D> {
    _section: CriticalSection,
    table: &'a mut JobTable,
    driver: &'a mut D,
    cpu_budget: NonZeroUsize,
}

impl<D: ProcessDriver> JobsGuard<'_, D> {
    /// Read-only view of the table.
    #[must_use]
    pub fn table(&self) -> &JobTable {
        &*self.table
    }

    /// Appends a waiting job.
    pub fn submit(&mut self, argv: Vec<String>) -> Result<JobId, JobError> {
        let (uid, position) = self.table.submit(argv)?;
        info!(target: JOBS_TARGET, uid = %uid, position, "job queued");
        Ok(uid)
    }

    /// Runs a scheduling pass.
    pub fn schedule(&mut self) -> ScheduleReport {
        scheduler::schedule(&mut *self.table, &mut *self.driver, self.cpu_budget)
    }

    /// Reaps finished children and prunes jobs flagged for removal.
    pub fn reap(&mut self) -> Result<Vec<JobId>, ReapError> {
        let finished = reaper::reap_all(&mut *self.table, &mut *self.driver)?;
        for uid in &finished {
            if let Some(job) = self.table.get_by_uid(*uid) {
                info!(
                    target: JOBS_TARGET,
                    uid = %uid,
                    state = job.state().abbreviation(),
                    code = job.exit_code(),
                    "job finished"
                );
            }
        }
        let pruned = self.table.prune_flagged();
        if pruned > 0 {
            info!(target: JOBS_TARGET, pruned, "removed finished jobs");
        }
        Ok(finished)
    }

    /// Moves job `uid` so it lands at `destination`.
    pub fn move_job(&mut self, uid: JobId, destination: usize) -> Result<(), QueueError> {
        let position = self
            .table
            .resolve_uid(uid)
            .ok_or(QueueError::UnknownJob(uid))?;
        self.table.move_range(position, 1, destination)?;
        info!(target: JOBS_TARGET, uid = %uid, from = position, to = destination, "job moved");
        Ok(())
    }

    /// Sends `signal` to the selected jobs and returns how many were running.
    ///
    /// Jobs that are not running are skipped. A child that vanished before
    /// the signal arrived is not an error; the reaper reconciles it.
    pub fn signal(&mut self, selection: Selection, signal: Signal) -> Result<usize, QueueError> {
        let positions = match selection {
            Selection::All => self
                .table
                .positions_in_state(StateFilter::Only(JobState::Running)),
            Selection::Job(uid) => vec![
                self.table
                    .resolve_uid(uid)
                    .ok_or(QueueError::UnknownJob(uid))?,
            ],
        };

        let mut signalled = 0;
        for position in positions {
            let Some(job) = self.table.get(position) else {
                continue;
            };
            if job.state() != JobState::Running {
                continue;
            }
            match job.kill(&mut *self.driver, signal) {
                Ok(()) => signalled += 1,
                Err(JobError::Signal {
                    source: Errno::ESRCH,
                    ..
                }) => {}
                Err(error) => return Err(error.into()),
            }
        }
        info!(target: JOBS_TARGET, signal = %signal, signalled, "signalled jobs");
        Ok(signalled)
    }

    /// Removes jobs from the table.
    ///
    /// Running jobs are flagged instead and disappear once reaped. Returns the
    /// number of jobs removed immediately.
    pub fn remove(&mut self, removal: Removal) -> Result<usize, QueueError> {
        match removal {
            Removal::Finished => {
                let terminal: Vec<usize> = self
                    .table
                    .iter()
                    .enumerate()
                    .filter(|(_, job)| job.state().is_terminal())
                    .map(|(position, _)| position)
                    .collect();
                for position in terminal.iter().rev() {
                    self.table.remove(*position);
                }
                Ok(terminal.len())
            }
            Removal::Job(uid) => {
                let position = self
                    .table
                    .resolve_uid(uid)
                    .ok_or(QueueError::UnknownJob(uid))?;
                let running = self
                    .table
                    .get(position)
                    .is_some_and(|job| job.state() == JobState::Running);
                if running {
                    if let Some(job) = self.table.get_mut(position) {
                        job.mark_for_removal();
                    }
                    return Ok(0);
                }
                Ok(usize::from(self.table.remove(position).is_some()))
            }
        }
    }

    /// Signals every running job and the daemon's process group ahead of
    /// shutdown. Failures are logged; nothing waits for the children.
    pub fn terminate_all(&mut self, signal: Signal) {
        match self.driver.signal_group(signal) {
            Ok(true) => info!(target: JOBS_TARGET, signal = %signal, "signalled process group"),
            Ok(false) => {}
            Err(errno) => warn!(
                target: JOBS_TARGET,
                signal = %signal,
                error = %errno,
                "failed to signal process group"
            ),
        }
        if let Err(error) = self.signal(Selection::All, signal) {
            warn!(target: JOBS_TARGET, error = %error, "failed to signal running jobs");
        }
    }
}

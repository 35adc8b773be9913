//! The job table: an ordered list of jobs plus the identity counter.

use nix::unistd::Pid;

use super::{OrderedList, RegistryError};
use crate::job::{Job, JobError, JobId, JobState};

/// Selects jobs by state when counting or collecting positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    /// Every job regardless of state.
    Any,
    /// Only jobs in the given state.
    Only(JobState),
}

impl StateFilter {
    fn matches(self, job: &Job) -> bool {
        match self {
            Self::Any => true,
            Self::Only(state) => job.state() == state,
        }
    }
}

/// Jobs in scheduling and display order.
///
/// Identities are handed out by the table and never reused, even after the
/// job they named has been removed.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: OrderedList<Job>,
    next_uid: u64,
}

impl JobTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waiting job for `argv` and appends it at the tail.
    ///
    /// Returns the new job's identity and position.
    pub fn submit(&mut self, argv: Vec<String>) -> Result<(JobId, usize), JobError> {
        let uid = JobId::new(self.next_uid);
        let job = Job::new(uid, argv)?;
        self.next_uid += 1;
        Ok((uid, self.jobs.append(job)))
    }

    /// Number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Job> {
        self.jobs.get(position)
    }

    /// Mutable job at `position`.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut Job> {
        self.jobs.get_mut(position)
    }

    /// Number of jobs matching `filter`.
    #[must_use]
    pub fn count_in_state(&self, filter: StateFilter) -> usize {
        self.jobs.iter().filter(|job| filter.matches(job)).count()
    }

    /// Positions of the jobs matching `filter`, in table order.
    #[must_use]
    pub fn positions_in_state(&self, filter: StateFilter) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| filter.matches(job))
            .map(|(position, _)| position)
            .collect()
    }

    /// Running job that owns `pid`.
    ///
    /// Finished jobs keep their old pid for display, so only running jobs
    /// can claim a newly reaped child.
    pub fn get_by_pid(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|job| job.state() == JobState::Running && job.pid() == Some(pid))
    }

    /// Job with identity `uid`.
    #[must_use]
    pub fn get_by_uid(&self, uid: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.uid() == uid)
    }

    /// Current position of the job with identity `uid`.
    #[must_use]
    pub fn resolve_uid(&self, uid: JobId) -> Option<usize> {
        self.jobs.position(|job| job.uid() == uid)
    }

    /// Relocates a contiguous block of jobs. See [`OrderedList::move_range`].
    pub fn move_range(
        &mut self,
        start: usize,
        count: usize,
        destination: usize,
    ) -> Result<(), RegistryError> {
        self.jobs.move_range(start, count, destination)
    }

    /// Removes the job at `position`.
    pub fn remove(&mut self, position: usize) -> Option<Job> {
        self.jobs.remove(position)
    }

    /// Drops finished jobs flagged for removal and returns how many went.
    pub fn prune_flagged(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|job| !(job.remove_on_exit() && job.state().is_terminal()));
        before - self.jobs.len()
    }

    /// Iterates in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

//! Collects terminated children and records their outcome on the owning job.

use nix::errno::Errno;
use thiserror::Error;
use tracing::debug;

use crate::job::{ChildEvent, ChildPoll, JOBS_TARGET, JobError, JobId, ProcessDriver};
use crate::registry::JobTable;

/// Failures while reaping. Every variant means the job table can no longer be
/// trusted, so all of them are fatal.
#[derive(Debug, Error)]
pub enum ReapError {
    /// Polling for child status failed.
    #[error("failed to wait for children: {0}")]
    Wait(#[source] Errno),
    /// A child terminated that no running job owns.
    #[error("reaped pid {pid} does not belong to any running job")]
    UnknownChild {
        /// Raw pid of the reaped child.
        pid: i32,
    },
    /// The owning job rejected the termination record.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Drains every pending child status change.
///
/// Returns the jobs that reached a terminal state, in the order their
/// children were reaped. Stop and continue notifications are logged only.
pub fn reap_all<D>(table: &mut JobTable, driver: &mut D) -> Result<Vec<JobId>, ReapError>
where
    D: ProcessDriver + ?Sized,
{
    let mut finished = Vec::new();
    loop {
        let event = match driver.poll_child().map_err(ReapError::Wait)? {
            ChildPoll::Idle | ChildPoll::NoChildren => return Ok(finished),
            ChildPoll::Event(event) => event,
        };

        if !event.is_termination() {
            log_suspension(event);
            continue;
        }

        let pid = event.pid();
        let job = table.get_by_pid(pid).ok_or(ReapError::UnknownChild {
            pid: pid.as_raw(),
        })?;
        job.wait_result(event)?;
        finished.push(job.uid());
    }
}

fn log_suspension(event: ChildEvent) {
    match event {
        ChildEvent::Stopped { pid, signal } => debug!(
            target: JOBS_TARGET,
            pid = pid.as_raw(),
            signal = %signal,
            "child stopped"
        ),
        other => debug!(
            target: JOBS_TARGET,
            pid = other.pid().as_raw(),
            "child continued"
        ),
    }
}
